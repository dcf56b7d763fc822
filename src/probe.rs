//! Structure probing and diagnostic tracing.
//!
//! [`probe`] answers one question about an opaque byte blob: does it parse
//! *completely* as a JCE struct? Any decode error, surplus byte or
//! resource-limit hit means "no" — the blob is then presumably just bytes.
//!
//! [`trace`] is the forgiving counterpart for offline analysis: it walks
//! the same structure but records everything it sees — tags, wire types,
//! scalar values, nesting — into a tree, annotates fields with names when
//! a schema is supplied, and keeps going past malformed regions by
//! recording the error at the offending node. Tracing never fails.

use generic;
use limits::Limits;
use reader::JceReader;
use schema::registry::SchemaRegistry;
use schema::{CompiledField, CompiledSchema, Kind};
use value::TarsValue;
use wire::{Head, JceType};

use byteorder::ByteOrder;
use std::sync::Arc;

/// Attempts a complete schemaless decode of `bytes`.
///
/// Returns the tag-keyed struct value when the whole buffer parses and
/// the cursor lands exactly on its end; `None` otherwise. Empty input is
/// not a struct. The limits apply as in any decode, so hostile inputs
/// cannot exhaust resources here either.
pub fn probe<B: ByteOrder>(bytes: &[u8], limits: Limits) -> Option<TarsValue> {
    if bytes.is_empty() {
        return None;
    }
    let mut r: JceReader<B> = JceReader::new(bytes, limits);
    match generic::decode_root(&mut r) {
        Ok(value) => {
            debug_assert!(!r.has_more());
            Some(value)
        }
        Err(_) => None,
    }
}

/// A node in the tree produced by [`trace`].
#[derive(Debug, Clone)]
pub struct TraceNode {
    /// Location of this node, `<root>.name[2].key` style. Schema-annotated
    /// fields contribute their names, everything else its decimal tag.
    pub path: String,
    /// The field tag; `None` for synthetic nodes (the root, error stubs).
    pub tag: Option<u8>,
    /// The wire type; `None` for synthetic nodes.
    pub ty: Option<JceType>,
    /// Field name, when a schema covers this tag.
    pub name: Option<Arc<str>>,
    /// Declared kind, when a schema covers this tag.
    pub type_name: Option<String>,
    /// The payload, for scalar nodes. Strings that fail UTF-8 validation
    /// are recorded as their raw bytes instead of failing the trace.
    pub value: Option<TarsValue>,
    /// Nested fields, elements and map entries, in wire order.
    pub children: Vec<TraceNode>,
    /// The decode error hit at this node, if its payload was malformed.
    pub error: Option<String>,
}

impl TraceNode {
    fn new(path: String) -> Self {
        TraceNode {
            path,
            tag: None,
            ty: None,
            name: None,
            type_name: None,
            value: None,
            children: Vec::new(),
            error: None,
        }
    }

    fn stub(path: &str, error: String) -> Self {
        let mut node = TraceNode::new(path.to_owned());
        node.error = Some(error);
        node
    }

    /// Whether this node or any descendant recorded an error.
    pub fn has_error(&self) -> bool {
        self.error.is_some() || self.children.iter().any(TraceNode::has_error)
    }
}

/// Walks `bytes` like a decode but records every field into a tree
/// instead of materialising values, without applying constraints and
/// without failing on unknown tags.
///
/// With a schema, tags it declares are annotated with field names and
/// kinds (recursively, through nested struct references resolved in
/// `registry`). On a malformed region the error lands on the offending
/// node, any bytes that can no longer be attributed are counted in a
/// terminal stub node, and the walk ends at the buffer's end either way.
// TODO: try to resynchronise on the next plausible head after an error
// instead of writing off the rest of the buffer
pub fn trace<B: ByteOrder>(
    bytes: &[u8],
    schema: Option<&CompiledSchema>,
    registry: &SchemaRegistry,
    limits: Limits,
) -> TraceNode {
    let mut r: JceReader<B> = JceReader::new(bytes, limits);
    let mut root = TraceNode::new("<root>".to_owned());
    root.type_name = schema.map(|s| format!("struct {}", s.name()));
    let poisoned = walk_fields(&mut r, &mut root, schema, registry, "<root>", true);
    if poisoned && r.has_more() {
        let stub = TraceNode::stub(
            "<root>",
            format!("{} trailing bytes left undecoded", r.remaining()),
        );
        root.children.push(stub);
    }
    root
}

/// Walks a field sequence: to EOF at the root, to the matching
/// `StructEnd` inside a frame. Returns whether the cursor was poisoned by
/// an error.
fn walk_fields<'a, B: ByteOrder>(
    r: &mut JceReader<'a, B>,
    parent: &mut TraceNode,
    schema: Option<&CompiledSchema>,
    registry: &SchemaRegistry,
    path: &str,
    at_root: bool,
) -> bool {
    loop {
        if at_root && !r.has_more() {
            return false;
        }
        let head = match r.read_head() {
            Ok(head) => head,
            Err(e) => {
                parent.children.push(TraceNode::stub(path, e.to_string()));
                return true;
            }
        };
        if head.is_struct_end() {
            if at_root {
                parent
                    .children
                    .push(TraceNode::stub(path, "unexpected struct end".to_owned()));
                return true;
            }
            return false;
        }

        let field: Option<&CompiledField> =
            schema.and_then(|s| s.slot_of_tag(head.tag).map(|slot| &s.fields()[slot]));
        let child_path = match field {
            Some(field) => format!("{}.{}", path, field.name()),
            None => format!("{}.{}", path, head.tag),
        };
        let (node, poisoned) = trace_value(
            r,
            head,
            child_path,
            field.map(CompiledField::name_arc),
            field.map(CompiledField::kind),
            registry,
        );
        parent.children.push(node);
        if poisoned {
            return true;
        }
    }
}

/// Traces one value whose head has been read. Returns the node and
/// whether the cursor is poisoned past it.
fn trace_value<'a, B: ByteOrder>(
    r: &mut JceReader<'a, B>,
    head: Head,
    path: String,
    name: Option<Arc<str>>,
    kind: Option<&Kind>,
    registry: &SchemaRegistry,
) -> (TraceNode, bool) {
    let mut node = TraceNode::new(path.clone());
    node.tag = Some(head.tag);
    node.ty = Some(head.ty);
    node.name = name;
    node.type_name = kind.map(Kind::describe);

    macro_rules! try_trace {
        ($expr:expr) => {
            match $expr {
                Ok(v) => v,
                Err(e) => {
                    node.error = Some(e.to_string());
                    return (node, true);
                }
            }
        };
    }

    match head.ty {
        JceType::ZeroTag => node.value = Some(TarsValue::Int(0)),
        JceType::Int1 | JceType::Int2 | JceType::Int4 | JceType::Int8 => {
            let v = try_trace!(r.read_int(head.ty));
            node.value = Some(TarsValue::Int(v));
        }
        JceType::Float => {
            let v = try_trace!(r.read_float32(head.ty));
            node.value = Some(TarsValue::Float(v));
        }
        JceType::Double => {
            let v = try_trace!(r.read_float(head.ty));
            node.value = Some(TarsValue::Double(v));
        }
        JceType::String1 | JceType::String4 => {
            let raw = try_trace!(r.read_string(head.ty));
            node.value = Some(match String::from_utf8(raw.to_vec()) {
                Ok(s) => TarsValue::Str(s),
                Err(e) => TarsValue::Bytes(e.into_bytes()),
            });
        }
        JceType::SimpleList => {
            let raw = try_trace!(r.read_simple_list());
            node.value = Some(TarsValue::Bytes(raw.to_vec()));
        }
        JceType::List => {
            let count = try_trace!(r.read_list_header());
            try_trace!(r.enter());
            for index in 0..count {
                let elem_head = match r.read_head() {
                    Ok(h) => h,
                    Err(e) => {
                        node.children.push(TraceNode::stub(&path, e.to_string()));
                        return (node, true);
                    }
                };
                let elem_path = format!("{}[{}]", path, index);
                let elem_kind = element_kind(kind, index);
                let (child, poisoned) =
                    trace_value(r, elem_head, elem_path, None, elem_kind, registry);
                node.children.push(child);
                if poisoned {
                    return (node, true);
                }
            }
            r.leave();
        }
        JceType::Map => {
            let count = try_trace!(r.read_map_header());
            try_trace!(r.enter());
            let (key_kind, value_kind) = entry_kinds(kind);
            for index in 0..count {
                for &(suffix, entry_kind) in &[("key", key_kind), ("value", value_kind)] {
                    let entry_head = match r.read_head() {
                        Ok(h) => h,
                        Err(e) => {
                            node.children.push(TraceNode::stub(&path, e.to_string()));
                            return (node, true);
                        }
                    };
                    let entry_path = format!("{}[{}].{}", path, index, suffix);
                    let (child, poisoned) =
                        trace_value(r, entry_head, entry_path, None, entry_kind, registry);
                    node.children.push(child);
                    if poisoned {
                        return (node, true);
                    }
                }
            }
            r.leave();
        }
        JceType::StructBegin => {
            try_trace!(r.enter());
            let child_schema = match strip_optional(kind) {
                Some(&Kind::Struct(id)) => registry.get(id).ok(),
                _ => None,
            };
            let poisoned = walk_fields(
                r,
                &mut node,
                child_schema.as_ref().map(|arc| &**arc),
                registry,
                &path,
                false,
            );
            if poisoned {
                return (node, true);
            }
            r.leave();
        }
        JceType::StructEnd => {
            node.error = Some("unexpected struct end".to_owned());
            return (node, true);
        }
    }
    (node, false)
}

/// The declared kind of a list/tuple element, if the outer kind is known.
fn element_kind(kind: Option<&Kind>, index: usize) -> Option<&Kind> {
    match strip_optional(kind) {
        Some(&Kind::List(ref elem)) | Some(&Kind::Set(ref elem)) => Some(elem),
        Some(&Kind::Tuple(ref kinds)) => kinds.get(index),
        _ => None,
    }
}

/// The declared key and value kinds of a map, if known.
fn entry_kinds(kind: Option<&Kind>) -> (Option<&Kind>, Option<&Kind>) {
    match strip_optional(kind) {
        Some(&Kind::Map(ref key, ref value)) => (Some(key), Some(value)),
        _ => (None, None),
    }
}

fn strip_optional(kind: Option<&Kind>) -> Option<&Kind> {
    match kind {
        Some(&Kind::Optional(ref inner)) => strip_optional(Some(inner)),
        other => other,
    }
}

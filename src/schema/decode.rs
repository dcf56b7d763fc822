//! Schema-driven decoding: tag-routed slot filling with compatibility
//! checks, integer narrowing, defaults and constraint evaluation.
//!
//! Decoding is order-independent: fields may arrive in any order, each tag
//! is routed through the schema's lookup table to its slot, and unknown
//! tags are skipped (or rejected, per the schema's options). Missing slots
//! fall back to their defaults once the struct ends.

use error::{CodecError, ErrorKind, PathSeg};
use generic;
use reader::JceReader;
use value::TarsValue;
use wire::{Head, JceType};
use super::registry::SchemaRegistry;
use super::{Bound, CompiledField, CompiledSchema, Constraint, IntWidth, Kind, SlotMask,
            StructOptions};

use byteorder::ByteOrder;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Decodes a top-level struct (a bare field sequence running to the end
/// of the buffer) against `schema`.
///
/// Returns one entry per schema field; only defaultless optional fields
/// can come back `None`.
pub fn decode_struct<'a, B: ByteOrder>(
    r: &mut JceReader<'a, B>,
    schema: &CompiledSchema,
    registry: &SchemaRegistry,
) -> Result<Vec<Option<TarsValue>>, CodecError> {
    let mut slots = vec![None; schema.field_count()];
    let mut seen = SlotMask::with_capacity(schema.field_count());
    while r.has_more() {
        let head = r.read_head()?;
        if head.is_struct_end() {
            return Err(ErrorKind::TypeMismatch {
                wire: JceType::StructEnd,
                expected: "a top-level field".to_owned(),
            }.into());
        }
        field_from_head(r, head, schema, registry, &mut slots, &mut seen)?;
    }
    finish_slots(schema, slots, &seen)
}

/// Decodes a framed struct body (after its `StructBegin` head) into a
/// tag-keyed struct map.
fn decode_nested<'a, B: ByteOrder>(
    r: &mut JceReader<'a, B>,
    schema: &CompiledSchema,
    registry: &SchemaRegistry,
) -> Result<TarsValue, CodecError> {
    let mut slots = vec![None; schema.field_count()];
    let mut seen = SlotMask::with_capacity(schema.field_count());
    r.read_struct_body(|r, head| {
        field_from_head(r, head, schema, registry, &mut slots, &mut seen)
    })?;
    let slots = finish_slots(schema, slots, &seen)?;
    let mut map = BTreeMap::new();
    for (field, slot) in schema.fields().iter().zip(slots) {
        if let Some(value) = slot {
            map.insert(field.tag() as i64, value);
        }
    }
    Ok(TarsValue::StructMap(map))
}

/// Routes one `(tag, type)` head: consume the field into its slot, or
/// skip/reject it when the schema does not declare the tag.
fn field_from_head<'a, B: ByteOrder>(
    r: &mut JceReader<'a, B>,
    head: Head,
    schema: &CompiledSchema,
    registry: &SchemaRegistry,
    slots: &mut [Option<TarsValue>],
    seen: &mut SlotMask,
) -> Result<(), CodecError> {
    match schema.slot_of_tag(head.tag) {
        Some(slot) => {
            if seen.get(slot) {
                if !schema.options().contains(StructOptions::ALLOW_DUPLICATES) {
                    return Err(ErrorKind::DuplicateTag { tag: head.tag }.into());
                }
                warn!(
                    "tag {} repeated in `{}`, keeping the last value",
                    head.tag,
                    schema.name()
                );
            }
            let field = &schema.fields()[slot];
            let value = decode_value(r, head, field.kind(), registry)
                .map_err(|e| e.at(PathSeg::Field(field.name_arc())))?;
            check_constraints(field, &value)
                .map_err(|e| e.at(PathSeg::Field(field.name_arc())))?;
            seen.set(slot);
            slots[slot] = Some(value);
            Ok(())
        }
        None => {
            if schema.options().contains(StructOptions::FORBID_UNKNOWN) {
                return Err(ErrorKind::UnknownTag {
                    tag: head.tag,
                    wire: head.ty,
                }.into());
            }
            debug!(
                "skipping unknown tag {} ({:?}) in `{}`",
                head.tag,
                head.ty,
                schema.name()
            );
            r.skip_field(head.ty)
        }
    }
}

/// Applies defaults to unset slots and reports missing required fields.
fn finish_slots(
    schema: &CompiledSchema,
    mut slots: Vec<Option<TarsValue>>,
    seen: &SlotMask,
) -> Result<Vec<Option<TarsValue>>, CodecError> {
    for (slot, field) in schema.fields().iter().enumerate() {
        if seen.get(slot) {
            continue;
        }
        if let Some(default) = field.default() {
            slots[slot] = Some(default.clone());
        } else if schema.required_mask().get(slot) {
            return Err(ErrorKind::MissingRequired {
                field: field.name_arc(),
                tag: field.tag(),
            }.into());
        }
    }
    Ok(slots)
}

/// Whether an observed wire type can decode into the declared kind.
///
/// Integer kinds accept every integer width plus `ZeroTag` (narrowing is
/// checked separately); `SimpleList` doubles as `Bytes` and as
/// `list<int8>`.
pub(crate) fn wire_compatible(kind: &Kind, ty: JceType) -> bool {
    match *kind {
        Kind::Bool | Kind::Int(_) | Kind::Enum(..) => is_int_type(ty),
        Kind::Float => ty == JceType::Float || ty == JceType::ZeroTag,
        Kind::Double => {
            ty == JceType::Float || ty == JceType::Double || ty == JceType::ZeroTag
        }
        Kind::Str => ty == JceType::String1 || ty == JceType::String4,
        Kind::Bytes => ty == JceType::SimpleList || ty == JceType::List,
        Kind::List(ref elem) => {
            ty == JceType::List
                || (ty == JceType::SimpleList && **elem == Kind::Int(IntWidth::W8))
        }
        Kind::Set(_) | Kind::Tuple(_) => ty == JceType::List,
        Kind::Map(..) => ty == JceType::Map,
        Kind::Struct(_) => ty == JceType::StructBegin,
        Kind::Optional(ref inner) => wire_compatible(inner, ty),
        Kind::Union(ref variants) => variants.iter().any(|k| wire_compatible(k, ty)),
        Kind::Any => ty != JceType::StructEnd,
    }
}

fn is_int_type(ty: JceType) -> bool {
    match ty {
        JceType::Int1 | JceType::Int2 | JceType::Int4 | JceType::Int8 | JceType::ZeroTag => true,
        _ => false,
    }
}

/// Decodes one value whose head has been read, according to its declared
/// kind.
fn decode_value<'a, B: ByteOrder>(
    r: &mut JceReader<'a, B>,
    head: Head,
    kind: &Kind,
    registry: &SchemaRegistry,
) -> Result<TarsValue, CodecError> {
    match *kind {
        Kind::Optional(ref inner) => decode_value(r, head, inner, registry),
        Kind::Bool => {
            let v = r.read_int(head.ty)?;
            Ok(TarsValue::Bool(v != 0))
        }
        Kind::Int(width) => {
            let v = r.read_int(head.ty)?;
            narrow(v, width)?;
            Ok(TarsValue::Int(v))
        }
        Kind::Enum(width, ref allowed) => {
            let v = r.read_int(head.ty)?;
            narrow(v, width)?;
            if !allowed.contains(&v) {
                return Err(ErrorKind::Validation {
                    reason: format!("{} is not a permitted enum value", v),
                }.into());
            }
            Ok(TarsValue::Int(v))
        }
        Kind::Float => Ok(TarsValue::Float(r.read_float32(head.ty)?)),
        Kind::Double => Ok(TarsValue::Double(r.read_float(head.ty)?)),
        Kind::Str => {
            let raw = r.read_string(head.ty)?;
            let s = String::from_utf8(raw.to_vec())
                .map_err(|_| CodecError::new(ErrorKind::InvalidUtf8))?;
            Ok(TarsValue::Str(s))
        }
        Kind::Bytes => match head.ty {
            JceType::SimpleList => Ok(TarsValue::Bytes(r.read_simple_list()?.to_vec())),
            JceType::List => {
                let count = r.read_list_header()?;
                r.enter()?;
                let mut bytes = Vec::with_capacity(count);
                for index in 0..count {
                    let elem = r.read_head()?;
                    let v = r
                        .read_int(elem.ty)
                        .map_err(|e| e.at(PathSeg::Index(index)))?;
                    if v < -128 || v > 255 {
                        return Err(CodecError::new(ErrorKind::OutOfRange {
                            value: v,
                            target: "a byte".to_owned(),
                        }).at(PathSeg::Index(index)));
                    }
                    bytes.push(v as u8);
                }
                r.leave();
                Ok(TarsValue::Bytes(bytes))
            }
            other => mismatch(kind, other),
        },
        Kind::List(ref elem) => match head.ty {
            JceType::List => decode_list(r, elem, registry),
            JceType::SimpleList => {
                if **elem == Kind::Int(IntWidth::W8) {
                    let raw = r.read_simple_list()?;
                    Ok(TarsValue::List(
                        raw.iter().map(|&b| TarsValue::Int(b as i8 as i64)).collect(),
                    ))
                } else {
                    mismatch(kind, head.ty)
                }
            }
            other => mismatch(kind, other),
        },
        Kind::Set(ref elem) => match head.ty {
            JceType::List => decode_list(r, elem, registry),
            other => mismatch(kind, other),
        },
        Kind::Tuple(ref kinds) => match head.ty {
            JceType::List => {
                let count = r.read_list_header()?;
                if count != kinds.len() {
                    return Err(ErrorKind::TypeMismatch {
                        wire: JceType::List,
                        expected: format!(
                            "a tuple of {} elements ({} on the wire)",
                            kinds.len(),
                            count
                        ),
                    }.into());
                }
                r.enter()?;
                let mut items = Vec::with_capacity(count);
                for (index, elem_kind) in kinds.iter().enumerate() {
                    let elem = r.read_head()?;
                    let value = decode_value(r, elem, elem_kind, registry)
                        .map_err(|e| e.at(PathSeg::Index(index)))?;
                    items.push(value);
                }
                r.leave();
                Ok(TarsValue::List(items))
            }
            other => mismatch(kind, other),
        },
        Kind::Map(ref key_kind, ref value_kind) => match head.ty {
            JceType::Map => {
                let count = r.read_map_header()?;
                r.enter()?;
                let mut pairs = Vec::with_capacity(count);
                for index in 0..count {
                    let key_head = r.read_head()?;
                    if key_head.tag != 0 {
                        return Err(ErrorKind::TypeMismatch {
                            wire: key_head.ty,
                            expected: "a map key at tag 0".to_owned(),
                        }.into());
                    }
                    let key = decode_value(r, key_head, key_kind, registry)
                        .map_err(|e| e.at(PathSeg::Index(index)))?;
                    let value_head = r.read_head()?;
                    if value_head.tag != 1 {
                        return Err(ErrorKind::TypeMismatch {
                            wire: value_head.ty,
                            expected: "a map value at tag 1".to_owned(),
                        }.into());
                    }
                    let value = decode_value(r, value_head, value_kind, registry)
                        .map_err(|e| e.at(PathSeg::Index(index)))?;
                    pairs.push((key, value));
                }
                r.leave();
                Ok(TarsValue::Map(pairs))
            }
            other => mismatch(kind, other),
        },
        Kind::Struct(id) => match head.ty {
            JceType::StructBegin => {
                let child = registry.get(id)?;
                decode_nested(r, &child, registry)
            }
            other => mismatch(kind, other),
        },
        Kind::Union(ref variants) => {
            for variant in variants {
                if wire_compatible(variant, head.ty) {
                    return decode_value(r, head, variant, registry);
                }
            }
            Err(ErrorKind::TypeMismatch {
                wire: head.ty,
                expected: kind.describe(),
            }.into())
        }
        Kind::Any => generic::decode_value(r, head),
    }
}

fn decode_list<'a, B: ByteOrder>(
    r: &mut JceReader<'a, B>,
    elem_kind: &Kind,
    registry: &SchemaRegistry,
) -> Result<TarsValue, CodecError> {
    let count = r.read_list_header()?;
    r.enter()?;
    let mut items = Vec::with_capacity(count);
    for index in 0..count {
        let elem = r.read_head()?;
        let value = decode_value(r, elem, elem_kind, registry)
            .map_err(|e| e.at(PathSeg::Index(index)))?;
        items.push(value);
    }
    r.leave();
    Ok(TarsValue::List(items))
}

fn mismatch(kind: &Kind, ty: JceType) -> Result<TarsValue, CodecError> {
    Err(ErrorKind::TypeMismatch {
        wire: ty,
        expected: kind.describe(),
    }.into())
}

fn narrow(value: i64, width: IntWidth) -> Result<(), CodecError> {
    if width.contains(value) {
        Ok(())
    } else {
        Err(ErrorKind::OutOfRange {
            value,
            target: width.name().to_owned(),
        }.into())
    }
}

/// Evaluates the field's compiled constraints against a freshly decoded
/// value.
fn check_constraints(field: &CompiledField, value: &TarsValue) -> Result<(), CodecError> {
    for constraint in field.constraints() {
        match *constraint {
            Constraint::Gt(ref bound) => {
                check_order(value, bound, Ordering::Greater, false, ">")?
            }
            Constraint::Lt(ref bound) => check_order(value, bound, Ordering::Less, false, "<")?,
            Constraint::Ge(ref bound) => {
                check_order(value, bound, Ordering::Greater, true, ">=")?
            }
            Constraint::Le(ref bound) => check_order(value, bound, Ordering::Less, true, "<=")?,
            Constraint::MinLen(min) => {
                let len = length_of(value)?;
                if len < min {
                    return Err(ErrorKind::Validation {
                        reason: format!("length {} is below the minimum of {}", len, min),
                    }.into());
                }
            }
            Constraint::MaxLen(max) => {
                let len = length_of(value)?;
                if len > max {
                    return Err(ErrorKind::Validation {
                        reason: format!("length {} is above the maximum of {}", len, max),
                    }.into());
                }
            }
            Constraint::Pattern(ref matcher) => match *value {
                TarsValue::Str(ref s) => {
                    if !matcher.matches(s) {
                        return Err(ErrorKind::Validation {
                            reason: format!("string does not match pattern `{}`", matcher.name()),
                        }.into());
                    }
                }
                ref other => {
                    return Err(ErrorKind::Validation {
                        reason: format!("pattern constraint applied to a {}", other.kind_name()),
                    }.into());
                }
            },
        }
    }
    Ok(())
}

fn check_order(
    value: &TarsValue,
    bound: &Bound,
    want: Ordering,
    or_equal: bool,
    symbol: &str,
) -> Result<(), CodecError> {
    let order = compare(value, bound).ok_or_else(|| {
        CodecError::new(ErrorKind::Validation {
            reason: format!("numeric constraint applied to a {}", value.kind_name()),
        })
    })?;
    if order == want || (or_equal && order == Ordering::Equal) {
        Ok(())
    } else {
        Err(ErrorKind::Validation {
            reason: format!("value is not {} {}", symbol, bound),
        }.into())
    }
}

/// Integer-against-integer comparisons stay exact; anything involving a
/// float goes through `f64`.
fn compare(value: &TarsValue, bound: &Bound) -> Option<Ordering> {
    match (value, bound) {
        (&TarsValue::Int(v), &Bound::Int(b)) => Some(v.cmp(&b)),
        (&TarsValue::Int(v), &Bound::Float(b)) => (v as f64).partial_cmp(&b),
        (&TarsValue::Float(v), b) => (v as f64).partial_cmp(&bound_as_f64(b)),
        (&TarsValue::Double(v), b) => v.partial_cmp(&bound_as_f64(b)),
        _ => None,
    }
}

fn bound_as_f64(bound: &Bound) -> f64 {
    match *bound {
        Bound::Int(v) => v as f64,
        Bound::Float(v) => v,
    }
}

fn length_of(value: &TarsValue) -> Result<usize, CodecError> {
    match *value {
        TarsValue::Str(ref s) => Ok(s.chars().count()),
        TarsValue::Bytes(ref b) => Ok(b.len()),
        TarsValue::List(ref items) => Ok(items.len()),
        TarsValue::Map(ref pairs) => Ok(pairs.len()),
        ref other => Err(ErrorKind::Validation {
            reason: format!("length constraint applied to a {}", other.kind_name()),
        }.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use limits::Limits;
    use schema::encode::encode_struct;
    use schema::{compile, FieldDef, Matcher, StructDescriptor};
    use writer::JceWriter;

    use byteorder::NetworkEndian;
    use std::collections::BTreeSet;

    fn encode_one(
        registry: &SchemaRegistry,
        schema: &CompiledSchema,
        slots: &[Option<TarsValue>],
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut w: JceWriter<NetworkEndian> = JceWriter::new(&mut buf, Limits::default());
            encode_struct(&mut w, slots, schema, registry).unwrap();
        }
        buf
    }

    fn decode_one(
        registry: &SchemaRegistry,
        schema: &CompiledSchema,
        bytes: &[u8],
    ) -> Result<Vec<Option<TarsValue>>, CodecError> {
        let mut r: JceReader<NetworkEndian> = JceReader::new(bytes, Limits::default());
        decode_struct(&mut r, schema, registry)
    }

    fn int_field(name: &str, tag: u32, width: IntWidth) -> FieldDef {
        FieldDef::new(name, tag, Kind::Int(width))
    }

    #[test]
    fn scalar_fields_round_trip() {
        let registry = SchemaRegistry::new();
        let schema = compile(
            StructDescriptor::new("Scalars")
                .field(int_field("id", 0, IntWidth::W32))
                .field(FieldDef::new("name", 1, Kind::Str))
                .field(FieldDef::new("score", 2, Kind::Double))
                .field(FieldDef::new("active", 3, Kind::Bool))
                .field(FieldDef::new("blob", 4, Kind::Bytes)),
        ).unwrap();

        let slots = vec![
            Some(TarsValue::Int(100)),
            Some(TarsValue::Str("Alice".to_owned())),
            Some(TarsValue::Double(1.5)),
            Some(TarsValue::Bool(true)),
            Some(TarsValue::Bytes(vec![1, 2, 3])),
        ];
        let bytes = encode_one(&registry, &schema, &slots);
        assert_eq!(decode_one(&registry, &schema, &bytes).unwrap(), slots);
    }

    #[test]
    fn zero_scalars_collapse_and_restore() {
        let registry = SchemaRegistry::new();
        let schema = compile(
            StructDescriptor::new("Zeroes")
                .field(int_field("n", 0, IntWidth::W32))
                .field(FieldDef::new("d", 1, Kind::Double))
                .field(FieldDef::new("b", 2, Kind::Bool)),
        ).unwrap();

        let slots = vec![
            Some(TarsValue::Int(0)),
            Some(TarsValue::Double(0.0)),
            Some(TarsValue::Bool(false)),
        ];
        let bytes = encode_one(&registry, &schema, &slots);
        // three bare ZeroTag heads
        assert_eq!(bytes, [0x0C, 0x1C, 0x2C]);
        assert_eq!(decode_one(&registry, &schema, &bytes).unwrap(), slots);
    }

    #[test]
    fn fields_decode_in_any_order() {
        let registry = SchemaRegistry::new();
        let schema = compile(
            StructDescriptor::new("Pair")
                .field(int_field("a", 0, IntWidth::W32))
                .field(int_field("b", 1, IntWidth::W32)),
        ).unwrap();

        // tag 1 first, then tag 0
        let bytes = [0x10, 0x02, 0x00, 0x01];
        let slots = decode_one(&registry, &schema, &bytes).unwrap();
        assert_eq!(slots[0], Some(TarsValue::Int(1)));
        assert_eq!(slots[1], Some(TarsValue::Int(2)));
    }

    #[test]
    fn unknown_tags_are_skipped_and_the_cursor_lands_on_eof() {
        let registry = SchemaRegistry::new();
        let new = compile(
            StructDescriptor::new("New")
                .field(int_field("id", 0, IntWidth::W32))
                .field(FieldDef::new("name", 1, Kind::Str)),
        ).unwrap();
        let old = compile(
            StructDescriptor::new("Old").field(int_field("id", 0, IntWidth::W32)),
        ).unwrap();

        let bytes = encode_one(
            &registry,
            &new,
            &[Some(TarsValue::Int(1)), Some(TarsValue::Str("Alice".to_owned()))],
        );
        let slots = decode_one(&registry, &old, &bytes).unwrap();
        assert_eq!(slots, vec![Some(TarsValue::Int(1))]);
    }

    #[test]
    fn forbid_unknown_rejects_undeclared_tags() {
        let registry = SchemaRegistry::new();
        let old = compile(
            StructDescriptor::new("Old")
                .field(int_field("id", 0, IntWidth::W32))
                .with_options(StructOptions::FORBID_UNKNOWN),
        ).unwrap();

        // id = 1 plus a string at tag 1 the schema does not know
        let bytes = [0x00, 0x01, 0x16, 0x02, b'h', b'i'];
        match *decode_one(&registry, &old, &bytes).unwrap_err().kind() {
            ErrorKind::UnknownTag { tag: 1, wire: JceType::String1 } => {}
            ref other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn duplicate_tags_are_rejected_by_default() {
        let registry = SchemaRegistry::new();
        let schema = compile(
            StructDescriptor::new("S").field(int_field("id", 0, IntWidth::W32)),
        ).unwrap();

        let bytes = [0x00, 0x01, 0x00, 0x02];
        match *decode_one(&registry, &schema, &bytes).unwrap_err().kind() {
            ErrorKind::DuplicateTag { tag: 0 } => {}
            ref other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn allow_duplicates_keeps_the_last_value() {
        let registry = SchemaRegistry::new();
        let schema = compile(
            StructDescriptor::new("S")
                .field(int_field("id", 0, IntWidth::W32))
                .with_options(StructOptions::ALLOW_DUPLICATES),
        ).unwrap();

        let bytes = [0x00, 0x01, 0x00, 0x02];
        let slots = decode_one(&registry, &schema, &bytes).unwrap();
        assert_eq!(slots[0], Some(TarsValue::Int(2)));
    }

    #[test]
    fn missing_required_field_is_reported_with_its_name() {
        let registry = SchemaRegistry::new();
        let schema = compile(
            StructDescriptor::new("S")
                .field(int_field("id", 0, IntWidth::W32))
                .field(FieldDef::new("name", 1, Kind::Str)),
        ).unwrap();

        let err = decode_one(&registry, &schema, &[0x00, 0x01]).unwrap_err();
        match *err.kind() {
            ErrorKind::MissingRequired { ref field, tag: 1 } => assert_eq!(&**field, "name"),
            ref other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn defaults_fill_unset_slots() {
        let registry = SchemaRegistry::new();
        let schema = compile(
            StructDescriptor::new("S")
                .field(int_field("id", 0, IntWidth::W32))
                .field(FieldDef::new("name", 1, Kind::Str).with_default("anon".into()))
                .field(FieldDef::new("items", 2, Kind::List(Box::new(Kind::Str))))
                .field(FieldDef::new("note", 3, Kind::Optional(Box::new(Kind::Str)))),
        ).unwrap();

        let slots = decode_one(&registry, &schema, &[0x00, 0x07]).unwrap();
        assert_eq!(slots[0], Some(TarsValue::Int(7)));
        assert_eq!(slots[1], Some(TarsValue::Str("anon".to_owned())));
        assert_eq!(slots[2], Some(TarsValue::List(Vec::new())));
        assert_eq!(slots[3], None);
    }

    #[test]
    fn narrowing_rejects_values_outside_the_declared_width() {
        let registry = SchemaRegistry::new();
        let schema = compile(
            StructDescriptor::new("S").field(int_field("small", 0, IntWidth::W8)),
        ).unwrap();

        // Int2 carrying 1000
        let bytes = [0x01, 0x03, 0xE8];
        let err = decode_one(&registry, &schema, &bytes).unwrap_err();
        assert_eq!(err.path().to_string(), "<root>.small");
        match *err.kind() {
            ErrorKind::OutOfRange { value: 1000, .. } => {}
            ref other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn bools_accept_any_nonzero_integer() {
        let registry = SchemaRegistry::new();
        let schema = compile(
            StructDescriptor::new("S").field(FieldDef::new("flag", 0, Kind::Bool)),
        ).unwrap();

        let slots = decode_one(&registry, &schema, &[0x01, 0x01, 0x00]).unwrap();
        assert_eq!(slots[0], Some(TarsValue::Bool(true)));
        let slots = decode_one(&registry, &schema, &[0x0C]).unwrap();
        assert_eq!(slots[0], Some(TarsValue::Bool(false)));
    }

    #[test]
    fn type_mismatch_names_both_sides() {
        let registry = SchemaRegistry::new();
        let schema = compile(
            StructDescriptor::new("S").field(FieldDef::new("name", 0, Kind::Str)),
        ).unwrap();

        // an Int1 where a string is declared
        let err = decode_one(&registry, &schema, &[0x00, 0x05]).unwrap_err();
        match *err.kind() {
            ErrorKind::TypeMismatch { wire: JceType::Int1, .. } => {}
            ref other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn constraints_gate_decoded_values() {
        let registry = SchemaRegistry::new();
        let schema = compile(
            StructDescriptor::new("S")
                .field(
                    int_field("age", 0, IntWidth::W32)
                        .with_constraint(Constraint::Ge(Bound::Int(0)))
                        .with_constraint(Constraint::Lt(Bound::Int(150))),
                )
                .field(
                    FieldDef::new("name", 1, Kind::Str)
                        .with_constraint(Constraint::MinLen(1))
                        .with_constraint(Constraint::MaxLen(8)),
                ),
        ).unwrap();

        let ok = encode_one(
            &registry,
            &schema,
            &[Some(TarsValue::Int(30)), Some(TarsValue::Str("Bob".to_owned()))],
        );
        assert!(decode_one(&registry, &schema, &ok).is_ok());

        let bad_age = encode_one(
            &registry,
            &schema,
            &[Some(TarsValue::Int(200)), Some(TarsValue::Str("Bob".to_owned()))],
        );
        let err = decode_one(&registry, &schema, &bad_age).unwrap_err();
        assert_eq!(err.path().to_string(), "<root>.age");
        match *err.kind() {
            ErrorKind::Validation { .. } => {}
            ref other => panic!("unexpected error: {:?}", other),
        }

        let empty_name = encode_one(
            &registry,
            &schema,
            &[Some(TarsValue::Int(30)), Some(TarsValue::Str(String::new()))],
        );
        assert!(decode_one(&registry, &schema, &empty_name).is_err());
    }

    #[test]
    fn pattern_constraints_use_the_supplied_matcher() {
        let registry = SchemaRegistry::new();
        let digits = Matcher::new("[0-9]+", |s: &str| {
            !s.is_empty() && s.chars().all(|c| c.is_digit(10))
        });
        let schema = compile(
            StructDescriptor::new("S").field(
                FieldDef::new("zip", 0, Kind::Str).with_constraint(Constraint::Pattern(digits)),
            ),
        ).unwrap();

        let ok = encode_one(&registry, &schema, &[Some(TarsValue::Str("12345".to_owned()))]);
        assert!(decode_one(&registry, &schema, &ok).is_ok());

        let bad = encode_one(&registry, &schema, &[Some(TarsValue::Str("12a45".to_owned()))]);
        let err = decode_one(&registry, &schema, &bad).unwrap_err();
        match *err.kind() {
            ErrorKind::Validation { ref reason } => assert!(reason.contains("[0-9]+")),
            ref other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn enums_check_membership_on_decode() {
        let registry = SchemaRegistry::new();
        let allowed: BTreeSet<i64> = [1, 2, 3].iter().cloned().collect();
        let schema = compile(
            StructDescriptor::new("S")
                .field(FieldDef::new("state", 0, Kind::Enum(IntWidth::W8, allowed))),
        ).unwrap();

        assert!(decode_one(&registry, &schema, &[0x00, 0x02]).is_ok());
        let err = decode_one(&registry, &schema, &[0x00, 0x09]).unwrap_err();
        match *err.kind() {
            ErrorKind::Validation { .. } => {}
            ref other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn unions_try_variants_in_declared_order() {
        let registry = SchemaRegistry::new();
        let schema = compile(StructDescriptor::new("S").field(FieldDef::new(
            "id",
            0,
            Kind::Union(vec![Kind::Int(IntWidth::W64), Kind::Str]),
        ))).unwrap();

        let slots = decode_one(&registry, &schema, &[0x00, 0x2A]).unwrap();
        assert_eq!(slots[0], Some(TarsValue::Int(42)));

        let slots = decode_one(&registry, &schema, &[0x06, 0x02, b'h', b'i']).unwrap();
        assert_eq!(slots[0], Some(TarsValue::Str("hi".to_owned())));

        // a map matches neither variant
        let err = decode_one(&registry, &schema, &[0x08, 0x0C]).unwrap_err();
        match *err.kind() {
            ErrorKind::TypeMismatch { wire: JceType::Map, .. } => {}
            ref other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn nested_structs_round_trip_through_the_registry() {
        let registry = SchemaRegistry::new();
        let inner = registry
            .register(
                StructDescriptor::new("Point")
                    .field(int_field("x", 0, IntWidth::W32))
                    .field(int_field("y", 1, IntWidth::W32)),
            )
            .unwrap();
        let outer = compile(
            StructDescriptor::new("Shape")
                .field(FieldDef::new("origin", 0, Kind::Struct(inner)))
                .field(FieldDef::new("label", 1, Kind::Str)),
        ).unwrap();

        let origin: TarsValue = TarsValue::StructMap(
            vec![(0, TarsValue::Int(3)), (1, TarsValue::Int(-4))]
                .into_iter()
                .collect(),
        );
        let slots = vec![Some(origin.clone()), Some(TarsValue::Str("p".to_owned()))];
        let bytes = encode_one(&registry, &outer, &slots);
        assert_eq!(decode_one(&registry, &outer, &bytes).unwrap(), slots);
    }

    #[test]
    fn nested_struct_defaults_apply_too() {
        let registry = SchemaRegistry::new();
        let inner = registry
            .register(
                StructDescriptor::new("Inner")
                    .field(int_field("x", 0, IntWidth::W32).with_default(TarsValue::Int(9))),
            )
            .unwrap();
        let outer = compile(
            StructDescriptor::new("Outer")
                .field(FieldDef::new("inner", 0, Kind::Struct(inner))),
        ).unwrap();

        // an empty frame: StructBegin at tag 0, StructEnd
        let slots = decode_one(&registry, &outer, &[0x0A, 0x0B]).unwrap();
        assert_eq!(
            slots[0],
            Some(TarsValue::StructMap(
                vec![(0, TarsValue::Int(9))].into_iter().collect()
            ))
        );
    }

    #[test]
    fn tuples_check_their_wire_arity() {
        let registry = SchemaRegistry::new();
        let schema = compile(StructDescriptor::new("S").field(FieldDef::new(
            "pair",
            0,
            Kind::Tuple(vec![Kind::Int(IntWidth::W32), Kind::Str]),
        ))).unwrap();

        let slots = vec![Some(TarsValue::List(vec![
            TarsValue::Int(7),
            TarsValue::Str("x".to_owned()),
        ]))];
        let bytes = encode_one(&registry, &schema, &slots);
        assert_eq!(decode_one(&registry, &schema, &bytes).unwrap(), slots);

        // a one-element list where the tuple wants two
        let short = [0x09, 0x00, 0x01, 0x0C];
        match *decode_one(&registry, &schema, &short).unwrap_err().kind() {
            ErrorKind::TypeMismatch { .. } => {}
            ref other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn bytes_kind_accepts_an_int_list() {
        let registry = SchemaRegistry::new();
        let schema = compile(
            StructDescriptor::new("S").field(FieldDef::new("blob", 0, Kind::Bytes)),
        ).unwrap();

        // List [1, 2, 255]
        let bytes = [0x09, 0x00, 0x03, 0x00, 0x01, 0x00, 0x02, 0x01, 0x00, 0xFF];
        let slots = decode_one(&registry, &schema, &bytes).unwrap();
        assert_eq!(slots[0], Some(TarsValue::Bytes(vec![1, 2, 255])));
    }

    #[test]
    fn byte_lists_accept_the_simple_list_form() {
        let registry = SchemaRegistry::new();
        let schema = compile(StructDescriptor::new("S").field(FieldDef::new(
            "codes",
            0,
            Kind::List(Box::new(Kind::Int(IntWidth::W8))),
        ))).unwrap();

        let bytes = [0x0D, 0x00, 0x00, 0x02, 0xFF, 0x01];
        let slots = decode_one(&registry, &schema, &bytes).unwrap();
        assert_eq!(
            slots[0],
            Some(TarsValue::List(vec![TarsValue::Int(-1), TarsValue::Int(1)]))
        );
    }

    #[test]
    fn maps_round_trip_with_non_string_keys() {
        let registry = SchemaRegistry::new();
        let schema = compile(StructDescriptor::new("S").field(FieldDef::new(
            "scores",
            0,
            Kind::Map(Box::new(Kind::Int(IntWidth::W32)), Box::new(Kind::Str)),
        ))).unwrap();

        let slots = vec![Some(TarsValue::Map(vec![
            (TarsValue::Int(2), TarsValue::Str("two".to_owned())),
            (TarsValue::Int(1), TarsValue::Str("one".to_owned())),
        ]))];
        let bytes = encode_one(&registry, &schema, &slots);
        // pair order is preserved exactly
        assert_eq!(decode_one(&registry, &schema, &bytes).unwrap(), slots);
    }

    #[test]
    fn any_fields_decode_whatever_is_on_the_wire() {
        let registry = SchemaRegistry::new();
        let schema = compile(
            StructDescriptor::new("S").field(FieldDef::new("payload", 0, Kind::Any)),
        ).unwrap();

        // a framed struct { 0: 5 }
        let bytes = [0x0A, 0x00, 0x05, 0x0B];
        let slots = decode_one(&registry, &schema, &bytes).unwrap();
        assert_eq!(
            slots[0],
            Some(TarsValue::StructMap(
                vec![(0, TarsValue::Int(5))].into_iter().collect()
            ))
        );
    }

    #[test]
    fn omit_defaults_skips_matching_values_and_decode_restores_them() {
        let registry = SchemaRegistry::new();
        let schema = compile(
            StructDescriptor::new("S")
                .field(int_field("id", 0, IntWidth::W32))
                .field(
                    FieldDef::new("retries", 1, Kind::Int(IntWidth::W32))
                        .with_default(TarsValue::Int(3)),
                )
                .with_options(StructOptions::OMIT_DEFAULTS),
        ).unwrap();

        let slots = vec![Some(TarsValue::Int(1)), Some(TarsValue::Int(3))];
        let bytes = encode_one(&registry, &schema, &slots);
        // only the id survives on the wire
        assert_eq!(bytes, [0x00, 0x01]);
        assert_eq!(decode_one(&registry, &schema, &bytes).unwrap(), slots);
    }

    #[test]
    fn optional_fields_skip_encoding_and_stay_none() {
        let registry = SchemaRegistry::new();
        let schema = compile(
            StructDescriptor::new("S")
                .field(int_field("id", 0, IntWidth::W32))
                .field(FieldDef::new("nick", 1, Kind::Optional(Box::new(Kind::Str)))),
        ).unwrap();

        let slots = vec![Some(TarsValue::Int(1)), None];
        let bytes = encode_one(&registry, &schema, &slots);
        assert_eq!(bytes, [0x00, 0x01]);
        assert_eq!(decode_one(&registry, &schema, &bytes).unwrap(), slots);

        let slots = vec![Some(TarsValue::Int(1)), Some(TarsValue::Str("Al".to_owned()))];
        let bytes = encode_one(&registry, &schema, &slots);
        assert_eq!(decode_one(&registry, &schema, &bytes).unwrap(), slots);
    }

    #[test]
    fn unset_required_slots_fail_encoding() {
        let registry = SchemaRegistry::new();
        let schema = compile(
            StructDescriptor::new("S").field(int_field("id", 0, IntWidth::W32)),
        ).unwrap();

        let mut buf = Vec::new();
        let mut w: JceWriter<NetworkEndian> = JceWriter::new(&mut buf, Limits::default());
        let err = encode_struct(&mut w, &[None], &schema, &registry).unwrap_err();
        match *err.kind() {
            ErrorKind::MissingRequired { tag: 0, .. } => {}
            ref other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn invalid_utf8_in_a_string_field_is_reported() {
        let registry = SchemaRegistry::new();
        let schema = compile(
            StructDescriptor::new("S").field(FieldDef::new("name", 0, Kind::Str)),
        ).unwrap();

        let bytes = [0x06, 0x02, 0xFF, 0xFE];
        let err = decode_one(&registry, &schema, &bytes).unwrap_err();
        match *err.kind() {
            ErrorKind::InvalidUtf8 => {}
            ref other => panic!("unexpected error: {:?}", other),
        }
    }
}

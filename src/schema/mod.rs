//! Schema compilation: declarative field descriptions are turned into
//! compiled tag-routing tables that make decoding an O(1) dispatch per
//! field.
//!
//! Compilation happens once, at registration time; a [`CompiledSchema`] is
//! immutable afterwards and can be shared freely across threads.

pub mod decode;
pub mod encode;
pub mod registry;

pub use self::registry::{default_registry, SchemaId, SchemaRegistry};

use error::{CodecError, ErrorKind};
use value::TarsValue;

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

bitflags! {
    /// Per-struct behaviour switches.
    pub struct StructOptions: u32 {
        /// On encode, skip fields whose value bit-equals the compiled
        /// default.
        const OMIT_DEFAULTS = 1 << 0;
        /// On decode, error on tags the schema does not declare instead of
        /// skipping them.
        const FORBID_UNKNOWN = 1 << 1;
        /// On decode, accept repeated tags; the last occurrence wins.
        const ALLOW_DUPLICATES = 1 << 2;
    }
}

impl Default for StructOptions {
    fn default() -> Self {
        StructOptions::empty()
    }
}

/// Narrowing target of an integer field.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    /// Whether the promoted value fits this width's signed range.
    pub fn contains(&self, value: i64) -> bool {
        match *self {
            IntWidth::W8 => value >= -128 && value <= 127,
            IntWidth::W16 => value >= -32_768 && value <= 32_767,
            IntWidth::W32 => value >= -2_147_483_648 && value <= 2_147_483_647,
            IntWidth::W64 => true,
        }
    }

    /// Name used in error messages.
    pub fn name(&self) -> &'static str {
        match *self {
            IntWidth::W8 => "int8",
            IntWidth::W16 => "int16",
            IntWidth::W32 => "int32",
            IntWidth::W64 => "int64",
        }
    }
}

/// The closed set of field types a schema can declare.
#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
    Bool,
    Int(IntWidth),
    Float,
    Double,
    Str,
    Bytes,
    List(Box<Kind>),
    /// Decoded like a list; the façade is responsible for deduplication.
    Set(Box<Kind>),
    /// A fixed-arity list with per-position kinds.
    Tuple(Vec<Kind>),
    Map(Box<Kind>, Box<Kind>),
    /// A nested struct, referenced by registry id so cyclic types stay
    /// expressible.
    Struct(SchemaId),
    /// An absent value is allowed and skipped on encode.
    Optional(Box<Kind>),
    /// An integer restricted to the given backing values (checked on
    /// decode only).
    Enum(IntWidth, BTreeSet<i64>),
    /// Untagged variants, tried in declaration order on decode.
    Union(Vec<Kind>),
    /// Any wire value, decoded as a [`TarsValue`].
    Any,
}

impl Kind {
    /// Human-readable description used in error messages and traces.
    pub fn describe(&self) -> String {
        match *self {
            Kind::Bool => "bool".to_owned(),
            Kind::Int(w) => w.name().to_owned(),
            Kind::Float => "float".to_owned(),
            Kind::Double => "double".to_owned(),
            Kind::Str => "string".to_owned(),
            Kind::Bytes => "bytes".to_owned(),
            Kind::List(ref e) => format!("list<{}>", e.describe()),
            Kind::Set(ref e) => format!("set<{}>", e.describe()),
            Kind::Tuple(ref ks) => format!("tuple<{}>", describe_all(ks)),
            Kind::Map(ref k, ref v) => format!("map<{}, {}>", k.describe(), v.describe()),
            Kind::Struct(id) => format!("struct#{}", id.value()),
            Kind::Optional(ref e) => format!("optional<{}>", e.describe()),
            Kind::Enum(w, _) => format!("enum<{}>", w.name()),
            Kind::Union(ref ks) => format!("union<{}>", describe_all(ks)),
            Kind::Any => "any".to_owned(),
        }
    }

    /// Whether an absent value is acceptable for this kind.
    pub fn is_optional(&self) -> bool {
        match *self {
            Kind::Optional(_) => true,
            _ => false,
        }
    }
}

fn describe_all(kinds: &[Kind]) -> String {
    let parts: Vec<String> = kinds.iter().map(Kind::describe).collect();
    parts.join(", ")
}

/// Whether a runtime value is shaped like the declared kind; used for
/// union variant selection, default validation and encode dispatch.
pub(crate) fn value_matches(kind: &Kind, value: &TarsValue) -> bool {
    match *kind {
        Kind::Bool => match *value {
            TarsValue::Bool(_) => true,
            _ => false,
        },
        Kind::Int(_) | Kind::Enum(..) => match *value {
            TarsValue::Int(_) => true,
            _ => false,
        },
        Kind::Float => match *value {
            TarsValue::Float(_) => true,
            _ => false,
        },
        Kind::Double => match *value {
            TarsValue::Double(_) | TarsValue::Float(_) => true,
            _ => false,
        },
        Kind::Str => match *value {
            TarsValue::Str(_) => true,
            _ => false,
        },
        Kind::Bytes => match *value {
            TarsValue::Bytes(_) => true,
            _ => false,
        },
        Kind::List(_) | Kind::Set(_) | Kind::Tuple(_) => match *value {
            TarsValue::List(_) => true,
            _ => false,
        },
        Kind::Map(..) => match *value {
            TarsValue::Map(_) => true,
            _ => false,
        },
        Kind::Struct(_) => match *value {
            TarsValue::StructMap(_) => true,
            _ => false,
        },
        Kind::Optional(ref inner) => value_matches(inner, value),
        Kind::Union(ref variants) => variants.iter().any(|k| value_matches(k, value)),
        Kind::Any => true,
    }
}

/// Pre-compiled pattern matcher supplied by the caller.
///
/// The codec applies it as an anchored full match over the decoded string
/// and attaches the matcher's name to validation errors. The pattern
/// language is whatever the supplier compiled; nothing here interprets it.
#[derive(Clone)]
pub struct Matcher {
    name: String,
    matcher: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl Matcher {
    /// Wraps a predicate under a display name (usually the pattern source).
    pub fn new<F>(name: &str, matcher: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Matcher {
            name: name.to_owned(),
            matcher: Arc::new(matcher),
        }
    }

    /// Runs the predicate.
    pub fn matches(&self, s: &str) -> bool {
        (self.matcher)(s)
    }

    /// The display name given at construction.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Matcher").field(&self.name).finish()
    }
}

/// A numeric constraint bound. Integer bounds compare exactly against
/// integer values; mixed comparisons go through `f64`.
#[derive(Debug, Clone)]
pub enum Bound {
    Int(i64),
    Float(f64),
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Bound::Int(v) => write!(f, "{}", v),
            Bound::Float(v) => write!(f, "{}", v),
        }
    }
}

/// A single decode-time field constraint.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Value must be strictly greater than the bound.
    Gt(Bound),
    /// Value must be strictly less than the bound.
    Lt(Bound),
    /// Value must be greater than or equal to the bound.
    Ge(Bound),
    /// Value must be less than or equal to the bound.
    Le(Bound),
    /// Minimum length (characters for strings, elements otherwise).
    MinLen(usize),
    /// Maximum length (characters for strings, elements otherwise).
    MaxLen(usize),
    /// The string must fully match the supplied matcher.
    Pattern(Matcher),
}

/// A single field description, as supplied by the caller.
///
/// The tag is taken as `u32` so out-of-range tags can be reported at
/// compilation instead of being silently truncated.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub tag: u32,
    pub kind: Kind,
    pub default: Option<TarsValue>,
    pub constraints: Vec<Constraint>,
    /// The façade transforms this field's value before encoding; carried
    /// through for its benefit, never acted on here.
    pub has_custom_serializer: bool,
    /// The façade transforms this field's value after decoding.
    pub has_custom_deserializer: bool,
}

impl FieldDef {
    /// Creates a plain field with no default and no constraints.
    pub fn new(name: &str, tag: u32, kind: Kind) -> Self {
        FieldDef {
            name: name.to_owned(),
            tag,
            kind,
            default: None,
            constraints: Vec::new(),
            has_custom_serializer: false,
            has_custom_deserializer: false,
        }
    }

    /// Attaches a default value.
    pub fn with_default(mut self, default: TarsValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Attaches a constraint; can be chained.
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}

/// A whole struct description: ordered fields plus per-struct options.
#[derive(Debug, Clone, Default)]
pub struct StructDescriptor {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub options: StructOptions,
}

impl StructDescriptor {
    /// Creates an empty descriptor.
    pub fn new(name: &str) -> Self {
        StructDescriptor {
            name: name.to_owned(),
            fields: Vec::new(),
            options: StructOptions::empty(),
        }
    }

    /// Appends a field; can be chained.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Sets the option flags.
    pub fn with_options(mut self, options: StructOptions) -> Self {
        self.options = options;
        self
    }
}

/// A growable bitset indexed by slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotMask {
    words: Vec<u64>,
}

impl SlotMask {
    /// Creates a mask able to hold `slots` bits, all clear.
    pub fn with_capacity(slots: usize) -> Self {
        SlotMask {
            words: vec![0; (slots + 63) / 64],
        }
    }

    /// Sets bit `index`.
    pub fn set(&mut self, index: usize) {
        self.words[index / 64] |= 1 << (index % 64);
    }

    /// Reads bit `index`.
    pub fn get(&self, index: usize) -> bool {
        self.words[index / 64] & (1 << (index % 64)) != 0
    }
}

/// A field after compilation: interned name, validated tag, effective
/// default.
#[derive(Debug, Clone)]
pub struct CompiledField {
    name: Arc<str>,
    tag: u8,
    kind: Kind,
    default: Option<TarsValue>,
    constraints: Vec<Constraint>,
    has_custom_serializer: bool,
    has_custom_deserializer: bool,
}

impl CompiledField {
    /// The field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }

    /// The field tag.
    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// The declared kind.
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// The effective default: the explicit one, or the implicit empty
    /// container for list/set/map fields. `None` for required fields and
    /// defaultless optionals.
    pub fn default(&self) -> Option<&TarsValue> {
        self.default.as_ref()
    }

    /// The compiled constraints, evaluated after decoding.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Whether the façade intercepts this field around encoding.
    pub fn has_custom_serializer(&self) -> bool {
        self.has_custom_serializer
    }

    /// Whether the façade intercepts this field around decoding.
    pub fn has_custom_deserializer(&self) -> bool {
        self.has_custom_deserializer
    }
}

/// A compiled struct schema: fields in ascending tag order plus the
/// routing table that makes decode dispatch O(1).
#[derive(Clone)]
pub struct CompiledSchema {
    name: Arc<str>,
    fields: Vec<CompiledField>,
    tag_lookup: [Option<u16>; 256],
    required_mask: SlotMask,
    default_mask: SlotMask,
    options: StructOptions,
}

impl CompiledSchema {
    /// The struct name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The compiled fields, ascending by tag. Slot indices index into this
    /// slice.
    pub fn fields(&self) -> &[CompiledField] {
        &self.fields
    }

    /// Number of fields/slots.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// O(1) tag-to-slot routing.
    pub fn slot_of_tag(&self, tag: u8) -> Option<usize> {
        self.tag_lookup[tag as usize].map(|slot| slot as usize)
    }

    /// Slots that must be present on the wire (no default, not optional).
    pub fn required_mask(&self) -> &SlotMask {
        &self.required_mask
    }

    /// Slots that fall back to a default (or are optional) when unset.
    pub fn default_mask(&self) -> &SlotMask {
        &self.default_mask
    }

    /// The per-struct option flags.
    pub fn options(&self) -> StructOptions {
        self.options
    }
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("options", &self.options)
            .finish()
    }
}

/// Compiles a descriptor, validating names, tags and defaults and
/// building the routing table. Runs at registration time, never per call.
pub fn compile(desc: StructDescriptor) -> Result<CompiledSchema, CodecError> {
    let mut defs = desc.fields;
    defs.sort_by_key(|f| f.tag);

    let mut fields = Vec::with_capacity(defs.len());
    let mut tag_lookup = [None; 256];
    let mut required_mask = SlotMask::with_capacity(defs.len());
    let mut default_mask = SlotMask::with_capacity(defs.len());
    let mut names = HashSet::new();

    for (slot, def) in defs.into_iter().enumerate() {
        if def.tag > 255 {
            return Err(ErrorKind::OutOfRange {
                value: def.tag as i64,
                target: format!("tag of field `{}`", def.name),
            }.into());
        }
        let tag = def.tag as u8;
        if tag_lookup[tag as usize].is_some() {
            return Err(ErrorKind::DuplicateTag { tag }.into());
        }
        tag_lookup[tag as usize] = Some(slot as u16);

        if !names.insert(def.name.clone()) {
            return Err(ErrorKind::Validation {
                reason: format!("duplicate field name `{}` in `{}`", def.name, desc.name),
            }.into());
        }

        if let Some(ref default) = def.default {
            if !value_matches(&def.kind, default) {
                return Err(ErrorKind::Validation {
                    reason: format!(
                        "default for field `{}` is a {}, not a {}",
                        def.name,
                        default.kind_name(),
                        def.kind.describe()
                    ),
                }.into());
            }
        }

        let default = effective_default(&def.kind, def.default);
        if default.is_some() || def.kind.is_optional() {
            default_mask.set(slot);
        } else {
            required_mask.set(slot);
        }

        fields.push(CompiledField {
            name: def.name.into(),
            tag,
            kind: def.kind,
            default,
            constraints: def.constraints,
            has_custom_serializer: def.has_custom_serializer,
            has_custom_deserializer: def.has_custom_deserializer,
        });
    }

    Ok(CompiledSchema {
        name: desc.name.into(),
        fields,
        tag_lookup,
        required_mask,
        default_mask,
        options: desc.options,
    })
}

/// An unset list/set/map slot falls back to an empty container; optionals
/// simply stay absent.
fn effective_default(kind: &Kind, explicit: Option<TarsValue>) -> Option<TarsValue> {
    if explicit.is_some() {
        return explicit;
    }
    match *kind {
        Kind::List(_) | Kind::Set(_) => Some(TarsValue::List(Vec::new())),
        Kind::Map(..) => Some(TarsValue::Map(Vec::new())),
        _ => None,
    }
}

//! The dynamic value representation used by the schemaless codec and by
//! fields declared `Any`.

use std::collections::BTreeMap;

/// Enum of the different values the codec can represent without a schema.
///
/// A *struct-shaped* map ([`TarsValue::StructMap`]) is semantically distinct
/// from an ordinary [`TarsValue::Map`] even though both hold key/value
/// pairs: the writer re-emits a `StructMap` framed as a struct and a `Map`
/// as a wire map. Map pairs keep the order they appeared in (on the wire,
/// or as supplied by the caller) and are never reordered.
#[derive(Debug, Clone, PartialEq)]
pub enum TarsValue {
    Bool(bool),
    /// Any wire integer, promoted to 64 bits.
    Int(i64),
    Float(f32),
    Double(f64),
    Str(String),
    /// A byte array (the `SimpleList` fast path).
    Bytes(Vec<u8>),
    List(Vec<TarsValue>),
    /// An ordinary map, in wire pair order.
    Map(Vec<(TarsValue, TarsValue)>),
    /// A struct as a map from field tag to value. Keys must be in 0..=255
    /// to be encodable; the wider key type lets the encoder report the
    /// out-of-range ones instead of silently truncating.
    StructMap(BTreeMap<i64, TarsValue>),
}

impl TarsValue {
    /// Short name of the variant, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match *self {
            TarsValue::Bool(_) => "bool",
            TarsValue::Int(_) => "int",
            TarsValue::Float(_) => "float",
            TarsValue::Double(_) => "double",
            TarsValue::Str(_) => "string",
            TarsValue::Bytes(_) => "bytes",
            TarsValue::List(_) => "list",
            TarsValue::Map(_) => "map",
            TarsValue::StructMap(_) => "struct",
        }
    }

    /// Bit-exact equality, as used by the `omit_defaults` comparison.
    ///
    /// Differs from `PartialEq` for floats: values compare by bit pattern,
    /// so `0.0` and `-0.0` are unequal and NaN equals itself.
    pub fn bit_eq(&self, other: &TarsValue) -> bool {
        match (self, other) {
            (&TarsValue::Bool(a), &TarsValue::Bool(b)) => a == b,
            (&TarsValue::Int(a), &TarsValue::Int(b)) => a == b,
            (&TarsValue::Float(a), &TarsValue::Float(b)) => a.to_bits() == b.to_bits(),
            (&TarsValue::Double(a), &TarsValue::Double(b)) => a.to_bits() == b.to_bits(),
            (&TarsValue::Str(ref a), &TarsValue::Str(ref b)) => a == b,
            (&TarsValue::Bytes(ref a), &TarsValue::Bytes(ref b)) => a == b,
            (&TarsValue::List(ref a), &TarsValue::List(ref b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.bit_eq(y))
            }
            (&TarsValue::Map(ref a), &TarsValue::Map(ref b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|(x, y)| x.0.bit_eq(&y.0) && x.1.bit_eq(&y.1))
            }
            (&TarsValue::StructMap(ref a), &TarsValue::StructMap(ref b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.bit_eq(vb))
            }
            _ => false,
        }
    }

    /// Returns the promoted integer if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            TarsValue::Int(i) => Some(i),
            _ => None,
        }
    }

    /// Returns the string slice if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match *self {
            TarsValue::Str(ref s) => Some(s),
            _ => None,
        }
    }

    /// Returns the byte slice if this is a `Bytes`.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match *self {
            TarsValue::Bytes(ref b) => Some(b),
            _ => None,
        }
    }
}

impl From<bool> for TarsValue {
    fn from(v: bool) -> Self {
        TarsValue::Bool(v)
    }
}

impl From<i8> for TarsValue {
    fn from(v: i8) -> Self {
        TarsValue::Int(v as i64)
    }
}

impl From<i16> for TarsValue {
    fn from(v: i16) -> Self {
        TarsValue::Int(v as i64)
    }
}

impl From<i32> for TarsValue {
    fn from(v: i32) -> Self {
        TarsValue::Int(v as i64)
    }
}

impl From<i64> for TarsValue {
    fn from(v: i64) -> Self {
        TarsValue::Int(v)
    }
}

impl From<u8> for TarsValue {
    fn from(v: u8) -> Self {
        TarsValue::Int(v as i64)
    }
}

impl From<u32> for TarsValue {
    fn from(v: u32) -> Self {
        TarsValue::Int(v as i64)
    }
}

impl From<f32> for TarsValue {
    fn from(v: f32) -> Self {
        TarsValue::Float(v)
    }
}

impl From<f64> for TarsValue {
    fn from(v: f64) -> Self {
        TarsValue::Double(v)
    }
}

impl<'a> From<&'a str> for TarsValue {
    fn from(v: &'a str) -> Self {
        TarsValue::Str(v.to_owned())
    }
}

impl From<String> for TarsValue {
    fn from(v: String) -> Self {
        TarsValue::Str(v)
    }
}

impl From<Vec<u8>> for TarsValue {
    fn from(v: Vec<u8>) -> Self {
        TarsValue::Bytes(v)
    }
}

impl From<Vec<TarsValue>> for TarsValue {
    fn from(v: Vec<TarsValue>) -> Self {
        TarsValue::List(v)
    }
}

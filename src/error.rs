//! Defines the error types reported by the codec.
//!
//! Every error carries a [`FieldPath`] locating the offending value inside
//! the decoded (or encoded) structure, rendered like
//! `<root>.user.addresses[2].zip`. Paths are attached while an error
//! propagates outwards, so the happy path pays nothing for them.

use wire::JceType;

use std::fmt;
use std::sync::Arc;

/// Error produced by encode, decode, schema compilation and registry
/// operations.
///
/// All failures are local decisions: the codec never retries, and a decode
/// returns on the first error it encounters.
#[derive(Debug, Clone, PartialEq, Fail)]
#[fail(display = "{}: {}", path, kind)]
pub struct CodecError {
    kind: ErrorKind,
    path: FieldPath,
}

impl CodecError {
    /// Creates an error with an empty path (an error at the root).
    pub fn new(kind: ErrorKind) -> Self {
        CodecError {
            kind,
            path: FieldPath::root(),
        }
    }

    /// The kind of failure.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Where inside the structure the failure happened.
    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    /// Prepends a path segment; called by each nesting level as the error
    /// propagates outwards.
    pub(crate) fn at(mut self, seg: PathSeg) -> Self {
        self.path.segs.insert(0, seg);
        self
    }
}

impl From<ErrorKind> for CodecError {
    fn from(kind: ErrorKind) -> Self {
        CodecError::new(kind)
    }
}

/// The different failure classes.
#[derive(Debug, Clone, PartialEq, Fail)]
pub enum ErrorKind {
    /// The buffer ended in the middle of a value.
    #[fail(display = "input truncated ({} bytes needed, {} available)", needed, available)]
    Truncated {
        /// How many bytes the current read demanded.
        needed: usize,
        /// How many bytes were left in the buffer.
        available: usize,
    },

    /// A head carried a type code outside 0..=13, or the inner head of a
    /// `SimpleList` was malformed.
    #[fail(display = "invalid wire type code {}", code)]
    BadType {
        /// The offending 4-bit code (or inner-head type code).
        code: u8,
    },

    /// The observed wire type is incompatible with what the decoder
    /// expected at this position.
    #[fail(display = "wire type {:?} incompatible with expected {}", wire, expected)]
    TypeMismatch {
        /// The wire type actually found.
        wire: JceType,
        /// Human-readable description of what was expected.
        expected: String,
    },

    /// An integer did not fit its narrowing target, or a tag left 0..=255.
    #[fail(display = "value {} out of range for {}", value, target)]
    OutOfRange {
        /// The out-of-range value, promoted to 64 bits.
        value: i64,
        /// What the value was narrowed into.
        target: String,
    },

    /// The nesting depth limit was hit.
    #[fail(display = "nesting depth exceeds limit of {}", limit)]
    DepthExceeded {
        /// The configured `max_depth`.
        limit: usize,
    },

    /// A declared container, string or byte-array length exceeded the
    /// configured limit.
    #[fail(display = "declared length {} exceeds limit of {}", len, limit)]
    LimitExceeded {
        /// The declared length.
        len: usize,
        /// The configured limit it ran into.
        limit: usize,
    },

    /// A tag not present in the schema was found while unknown tags are
    /// forbidden.
    #[fail(display = "unknown tag {} (wire type {:?})", tag, wire)]
    UnknownTag {
        /// The undeclared tag.
        tag: u8,
        /// The wire type it carried.
        wire: JceType,
    },

    /// The same tag was routed to the same slot twice.
    #[fail(display = "tag {} appears more than once", tag)]
    DuplicateTag {
        /// The repeated tag.
        tag: u8,
    },

    /// A required slot was still unset when the struct ended.
    #[fail(display = "required field `{}` (tag {}) missing", field, tag)]
    MissingRequired {
        /// Name of the missing field.
        field: Arc<str>,
        /// Its tag.
        tag: u8,
    },

    /// A field constraint failed after decoding.
    #[fail(display = "constraint violated: {}", reason)]
    Validation {
        /// Why the value was rejected.
        reason: String,
    },

    /// Wire string data was not valid UTF-8.
    #[fail(display = "string data is not valid UTF-8")]
    InvalidUtf8,

    /// A schema reference could not be resolved in the registry.
    #[fail(display = "schema id {} is not defined", id)]
    UnknownSchema {
        /// The raw id that failed to resolve.
        id: u32,
    },
}

/// A path from the decode root down to a value, e.g.
/// `<root>.user.addresses[2].zip`.
///
/// Schema-aware operations contribute field names; the schemaless codec
/// contributes decimal tags; container elements contribute indices.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldPath {
    segs: Vec<PathSeg>,
}

impl FieldPath {
    /// The empty path, pointing at the root value.
    pub fn root() -> Self {
        FieldPath { segs: Vec::new() }
    }

    /// The segments making up this path, outermost first.
    pub fn segments(&self) -> &[PathSeg] {
        &self.segs
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("<root>")?;
        for seg in &self.segs {
            match *seg {
                PathSeg::Field(ref name) => write!(f, ".{}", name)?,
                PathSeg::Tag(tag) => write!(f, ".{}", tag)?,
                PathSeg::Index(idx) => write!(f, "[{}]", idx)?,
            }
        }
        Ok(())
    }
}

/// One step in a [`FieldPath`].
#[derive(Debug, Clone, PartialEq)]
pub enum PathSeg {
    /// A named struct field (schema-aware decode).
    Field(Arc<str>),
    /// A tag without a known name (schemaless decode).
    Tag(u8),
    /// A list element or map pair position.
    Index(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_rendering() {
        let err = CodecError::new(ErrorKind::InvalidUtf8)
            .at(PathSeg::Index(2))
            .at(PathSeg::Field("addresses".into()))
            .at(PathSeg::Field("user".into()));
        assert_eq!(err.path().to_string(), "<root>.user.addresses[2]");
        assert_eq!(
            err.to_string(),
            "<root>.user.addresses[2]: string data is not valid UTF-8"
        );
    }

    #[test]
    fn tag_segments_render_as_decimals() {
        let err = CodecError::new(ErrorKind::DuplicateTag { tag: 7 }).at(PathSeg::Tag(3));
        assert_eq!(err.path().to_string(), "<root>.3");
    }
}

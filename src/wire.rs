//! Wire-level primitives: the closed set of type codes and the one- or
//! two-byte field heads carrying them.

use error::{CodecError, ErrorKind};

use num_traits::FromPrimitive;

/// The JCE wire type codes (4 bits on the wire).
///
/// This enum is closed by the protocol: host-level types map onto one of
/// these, they never extend the set.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
pub enum JceType {
    Int1 = 0,
    Int2 = 1,
    Int4 = 2,
    Int8 = 3,
    Float = 4,
    Double = 5,
    String1 = 6,
    String4 = 7,
    Map = 8,
    List = 9,
    StructBegin = 10,
    StructEnd = 11,
    /// A numerically-zero scalar; the head is the whole field, there is no
    /// payload.
    ZeroTag = 12,
    /// Byte-array fast path for `vector<byte>`.
    SimpleList = 13,
}

impl JceType {
    /// Converts a raw 4-bit code, rejecting the two codes the protocol
    /// leaves unassigned.
    pub fn from_code(code: u8) -> Result<Self, CodecError> {
        JceType::from_u8(code).ok_or_else(|| ErrorKind::BadType { code }.into())
    }
}

/// A field head: tag plus wire type.
///
/// Encodes as `(tag << 4) | type` when the tag fits in the high nibble;
/// tags 15..=255 switch to the two-byte form `(0xF0 | type), tag`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Head {
    pub tag: u8,
    pub ty: JceType,
}

impl Head {
    /// Creates a head. All `u8` tags are representable.
    pub fn new(tag: u8, ty: JceType) -> Self {
        Head { tag, ty }
    }

    /// Encodes the head into its wire form.
    ///
    /// Returns the backing array and how many of its bytes are valid (1 or
    /// 2).
    pub fn encode(&self) -> ([u8; 2], usize) {
        if self.tag < 15 {
            ([(self.tag << 4) | self.ty as u8, 0], 1)
        } else {
            ([0xF0 | self.ty as u8, self.tag], 2)
        }
    }

    /// Whether this head terminates a struct frame.
    pub fn is_struct_end(&self) -> bool {
        self.ty == JceType::StructEnd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_match_the_protocol() {
        assert_eq!(JceType::from_code(0).unwrap(), JceType::Int1);
        assert_eq!(JceType::from_code(12).unwrap(), JceType::ZeroTag);
        assert_eq!(JceType::from_code(13).unwrap(), JceType::SimpleList);
        assert!(JceType::from_code(14).is_err());
        assert!(JceType::from_code(15).is_err());
    }

    #[test]
    fn short_head_for_small_tags() {
        let (bytes, len) = Head::new(0, JceType::Int1).encode();
        assert_eq!(&bytes[..len], &[0x00]);

        let (bytes, len) = Head::new(1, JceType::String1).encode();
        assert_eq!(&bytes[..len], &[0x16]);

        // 14 is the largest tag that still fits the single-byte form
        let (bytes, len) = Head::new(14, JceType::ZeroTag).encode();
        assert_eq!(&bytes[..len], &[0xEC]);
    }

    #[test]
    fn extended_head_from_tag_15_up() {
        let (bytes, len) = Head::new(15, JceType::Int1).encode();
        assert_eq!(&bytes[..len], &[0xF0, 15]);

        let (bytes, len) = Head::new(255, JceType::Double).encode();
        assert_eq!(&bytes[..len], &[0xF5, 255]);
    }
}

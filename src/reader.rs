//! Streaming reader for JCE-encoded data.
//!
//! The reader is a cursor over untrusted bytes: every read validates
//! against the remaining buffer before consuming, and declared lengths are
//! checked against both the configured [`Limits`] and the bytes actually
//! left, so no allocation proportional to attacker-controlled sizes can
//! happen.
//!
//! The byte order is a compile-time parameter (`B: ByteOrder`), giving the
//! default big-endian path and the little-endian variant as two
//! monomorphised copies with no per-read branch.

use error::{CodecError, ErrorKind};
use limits::Limits;
use wire::{Head, JceType};

use byteorder::{ByteOrder, NetworkEndian};
use std::marker::PhantomData;

/// Streaming reader over a byte slice containing JCE data.
#[derive(Debug, Clone)]
pub struct JceReader<'a, B: ByteOrder = NetworkEndian> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
    limits: Limits,
    _endian: PhantomData<B>,
}

impl<'a, B: ByteOrder> JceReader<'a, B> {
    /// Creates a reader over `data`.
    pub fn new(data: &'a [u8], limits: Limits) -> Self {
        JceReader {
            data,
            pos: 0,
            depth: 0,
            limits,
            _endian: PhantomData,
        }
    }

    /// Current byte offset into the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether any bytes are left.
    pub fn has_more(&self) -> bool {
        self.remaining() > 0
    }

    /// The limits this reader enforces.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Consumes exactly `n` bytes, or fails with `Truncated` without
    /// consuming anything.
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if n > self.remaining() {
            return Err(ErrorKind::Truncated {
                needed: n,
                available: self.remaining(),
            }.into());
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    /// Reads a field head (one or two bytes).
    pub fn read_head(&mut self) -> Result<Head, CodecError> {
        let byte = self.take_u8()?;
        let ty = JceType::from_code(byte & 0x0F)?;
        let tag = byte >> 4;
        let tag = if tag == 0x0F { self.take_u8()? } else { tag };
        Ok(Head::new(tag, ty))
    }

    /// Reads the next head without advancing the cursor.
    pub fn peek_head(&mut self) -> Result<Head, CodecError> {
        let saved = self.pos;
        let head = self.read_head();
        self.pos = saved;
        head
    }

    /// Reads an integer payload of the given wire type, promoted to 64
    /// bits. `ZeroTag` yields 0 without consuming payload bytes.
    pub fn read_int(&mut self, ty: JceType) -> Result<i64, CodecError> {
        match ty {
            JceType::ZeroTag => Ok(0),
            JceType::Int1 => Ok(self.take_u8()? as i8 as i64),
            JceType::Int2 => Ok(B::read_i16(self.take(2)?) as i64),
            JceType::Int4 => Ok(B::read_i32(self.take(4)?) as i64),
            JceType::Int8 => Ok(B::read_i64(self.take(8)?)),
            other => Err(ErrorKind::TypeMismatch {
                wire: other,
                expected: "an integer".to_owned(),
            }.into()),
        }
    }

    /// Reads a floating-point payload of the given wire type as `f64`.
    pub fn read_float(&mut self, ty: JceType) -> Result<f64, CodecError> {
        match ty {
            JceType::ZeroTag => Ok(0.0),
            JceType::Float => Ok(B::read_f32(self.take(4)?) as f64),
            JceType::Double => Ok(B::read_f64(self.take(8)?)),
            other => Err(ErrorKind::TypeMismatch {
                wire: other,
                expected: "a float or double".to_owned(),
            }.into()),
        }
    }

    /// Reads a single-precision payload. Unlike [`JceReader::read_float`]
    /// this refuses `Double`, so a declared `float` field never silently
    /// truncates a wider value.
    pub fn read_float32(&mut self, ty: JceType) -> Result<f32, CodecError> {
        match ty {
            JceType::ZeroTag => Ok(0.0),
            JceType::Float => Ok(B::read_f32(self.take(4)?)),
            other => Err(ErrorKind::TypeMismatch {
                wire: other,
                expected: "a float".to_owned(),
            }.into()),
        }
    }

    /// Reads a length-prefixed string payload and returns the raw bytes.
    ///
    /// `String1` carries a `u8` length, `String4` a `u32` one. The length
    /// is validated against the limits and the remaining buffer before the
    /// body is touched. Callers that want text validate UTF-8 themselves;
    /// the wire makes no promise about the encoding.
    pub fn read_string(&mut self, ty: JceType) -> Result<&'a [u8], CodecError> {
        let len = match ty {
            JceType::String1 => self.take_u8()? as usize,
            JceType::String4 => B::read_u32(self.take(4)?) as usize,
            other => {
                return Err(ErrorKind::TypeMismatch {
                    wire: other,
                    expected: "a string".to_owned(),
                }.into());
            }
        };
        if len > self.limits.max_string_len {
            return Err(ErrorKind::LimitExceeded {
                len,
                limit: self.limits.max_string_len,
            }.into());
        }
        self.take(len)
    }

    /// Reads a `SimpleList` payload (after its outer head): the inner
    /// byte-marker head, the tagged length, then that many raw bytes.
    pub fn read_simple_list(&mut self) -> Result<&'a [u8], CodecError> {
        let inner = self.read_head()?;
        if inner.ty != JceType::Int1 {
            return Err(ErrorKind::BadType { code: inner.ty as u8 }.into());
        }
        if inner.tag != 0 {
            return Err(ErrorKind::TypeMismatch {
                wire: inner.ty,
                expected: "a byte marker at tag 0".to_owned(),
            }.into());
        }
        let len = self.read_tagged_count()?;
        if len > self.limits.max_bytes_len {
            return Err(ErrorKind::LimitExceeded {
                len,
                limit: self.limits.max_bytes_len,
            }.into());
        }
        self.take(len)
    }

    /// Reads the tagged element count of a `List` (after its head).
    pub fn read_list_header(&mut self) -> Result<usize, CodecError> {
        let count = self.read_tagged_count()?;
        if count > self.limits.max_container_len {
            return Err(ErrorKind::LimitExceeded {
                len: count,
                limit: self.limits.max_container_len,
            }.into());
        }
        // every element needs at least a head byte
        if count > self.remaining() {
            return Err(ErrorKind::Truncated {
                needed: count,
                available: self.remaining(),
            }.into());
        }
        Ok(count)
    }

    /// Reads the tagged pair count of a `Map` (after its head).
    pub fn read_map_header(&mut self) -> Result<usize, CodecError> {
        let count = self.read_tagged_count()?;
        if count > self.limits.max_container_len {
            return Err(ErrorKind::LimitExceeded {
                len: count,
                limit: self.limits.max_container_len,
            }.into());
        }
        // every pair needs at least two head bytes
        if count.saturating_mul(2) > self.remaining() {
            return Err(ErrorKind::Truncated {
                needed: count.saturating_mul(2),
                available: self.remaining(),
            }.into());
        }
        Ok(count)
    }

    /// Reads a length/count encoded as a tagged integer at tag 0.
    fn read_tagged_count(&mut self) -> Result<usize, CodecError> {
        let head = self.read_head()?;
        if head.tag != 0 {
            return Err(ErrorKind::TypeMismatch {
                wire: head.ty,
                expected: "a length at tag 0".to_owned(),
            }.into());
        }
        let count = self.read_int(head.ty)?;
        if count < 0 {
            return Err(ErrorKind::OutOfRange {
                value: count,
                target: "a length".to_owned(),
            }.into());
        }
        Ok(count as usize)
    }

    /// Reads struct fields until the matching `StructEnd`, handing each
    /// head to `f`. The callback must consume the field's value (or skip
    /// it via [`JceReader::skip_field`]).
    pub fn read_struct_body<F>(&mut self, mut f: F) -> Result<(), CodecError>
    where
        F: FnMut(&mut Self, Head) -> Result<(), CodecError>,
    {
        self.enter()?;
        loop {
            let head = self.read_head()?;
            if head.is_struct_end() {
                if head.tag != 0 {
                    return Err(ErrorKind::TypeMismatch {
                        wire: JceType::StructEnd,
                        expected: "a struct end at tag 0".to_owned(),
                    }.into());
                }
                break;
            }
            f(self, head)?;
        }
        self.leave();
        Ok(())
    }

    /// Skips a single field's payload without allocating.
    ///
    /// Containers recurse; the depth limit is re-checked on every descent.
    pub fn skip_field(&mut self, ty: JceType) -> Result<(), CodecError> {
        match ty {
            JceType::ZeroTag => Ok(()),
            JceType::Int1 => self.take(1).map(|_| ()),
            JceType::Int2 => self.take(2).map(|_| ()),
            JceType::Int4 | JceType::Float => self.take(4).map(|_| ()),
            JceType::Int8 | JceType::Double => self.take(8).map(|_| ()),
            JceType::String1 | JceType::String4 => self.read_string(ty).map(|_| ()),
            JceType::SimpleList => self.read_simple_list().map(|_| ()),
            JceType::List => {
                self.enter()?;
                let count = self.read_list_header()?;
                for _ in 0..count {
                    let head = self.read_head()?;
                    self.skip_field(head.ty)?;
                }
                self.leave();
                Ok(())
            }
            JceType::Map => {
                self.enter()?;
                let count = self.read_map_header()?;
                for _ in 0..count {
                    let key = self.read_head()?;
                    self.skip_field(key.ty)?;
                    let value = self.read_head()?;
                    self.skip_field(value.ty)?;
                }
                self.leave();
                Ok(())
            }
            JceType::StructBegin => self.read_struct_body(|r, head| r.skip_field(head.ty)),
            JceType::StructEnd => Err(ErrorKind::TypeMismatch {
                wire: JceType::StructEnd,
                expected: "a field value".to_owned(),
            }.into()),
        }
    }

    /// Records one level of container nesting, failing when the depth
    /// limit is hit.
    pub(crate) fn enter(&mut self) -> Result<(), CodecError> {
        if self.depth >= self.limits.max_depth {
            return Err(ErrorKind::DepthExceeded {
                limit: self.limits.max_depth,
            }.into());
        }
        self.depth += 1;
        Ok(())
    }

    /// Leaves one level of container nesting.
    pub(crate) fn leave(&mut self) {
        self.depth -= 1;
    }
}

//! Writer for producing JCE-encoded data.
//!
//! The writer appends to a caller-supplied buffer (so buffers can be
//! reused across calls) and picks the most compact wire form for every
//! value: integers shrink to the smallest width that holds them, exact
//! zeroes collapse to a bare `ZeroTag` head, strings switch between the
//! one- and four-byte length prefix at 256 bytes, and byte arrays use the
//! `SimpleList` fast path.

use error::{CodecError, ErrorKind};
use limits::Limits;
use wire::{Head, JceType};

use byteorder::{ByteOrder, NetworkEndian};
use std::marker::PhantomData;

/// Appending writer producing JCE wire data into a reusable buffer.
///
/// On an encode error, callers should [`JceWriter::rollback`] so the buffer
/// is restored to its pre-call length; partial output is never handed out.
#[derive(Debug)]
pub struct JceWriter<'a, B: ByteOrder = NetworkEndian> {
    buf: &'a mut Vec<u8>,
    start: usize,
    depth: usize,
    limits: Limits,
    _endian: PhantomData<B>,
}

impl<'a, B: ByteOrder> JceWriter<'a, B> {
    /// Creates a writer appending to `buf`.
    pub fn new(buf: &'a mut Vec<u8>, limits: Limits) -> Self {
        let start = buf.len();
        JceWriter {
            buf,
            start,
            depth: 0,
            limits,
            _endian: PhantomData,
        }
    }

    /// Number of bytes written by this writer so far.
    pub fn written(&self) -> usize {
        self.buf.len() - self.start
    }

    /// Truncates the buffer back to its pre-call length, discarding
    /// everything this writer appended.
    pub fn rollback(&mut self) {
        self.buf.truncate(self.start);
    }

    /// Appends a field head.
    pub fn write_head(&mut self, tag: u8, ty: JceType) {
        let (bytes, len) = Head::new(tag, ty).encode();
        self.buf.extend_from_slice(&bytes[..len]);
    }

    /// Appends a tagged integer in its most compact form: exact zero is a
    /// bare `ZeroTag` head, everything else the smallest of `Int1..Int8`
    /// whose signed range holds the value.
    pub fn write_int(&mut self, tag: u8, value: i64) {
        if value == 0 {
            self.write_head(tag, JceType::ZeroTag);
        } else if value >= -128 && value <= 127 {
            self.write_head(tag, JceType::Int1);
            self.buf.push(value as u8);
        } else if value >= -32_768 && value <= 32_767 {
            self.write_head(tag, JceType::Int2);
            let mut raw = [0; 2];
            B::write_i16(&mut raw, value as i16);
            self.buf.extend_from_slice(&raw);
        } else if value >= -2_147_483_648 && value <= 2_147_483_647 {
            self.write_head(tag, JceType::Int4);
            let mut raw = [0; 4];
            B::write_i32(&mut raw, value as i32);
            self.buf.extend_from_slice(&raw);
        } else {
            self.write_head(tag, JceType::Int8);
            let mut raw = [0; 8];
            B::write_i64(&mut raw, value);
            self.buf.extend_from_slice(&raw);
        }
    }

    /// Appends a tagged bool: `ZeroTag` for `false`, `Int1` carrying 1 for
    /// `true`.
    pub fn write_bool(&mut self, tag: u8, value: bool) {
        self.write_int(tag, value as i64);
    }

    /// Appends a tagged double.
    ///
    /// A value whose bit pattern is all zeros collapses to `ZeroTag`;
    /// `-0.0` (and NaN) keep their payload.
    pub fn write_float(&mut self, tag: u8, value: f64) {
        if value.to_bits() == 0 {
            self.write_head(tag, JceType::ZeroTag);
        } else {
            self.write_head(tag, JceType::Double);
            let mut raw = [0; 8];
            B::write_f64(&mut raw, value);
            self.buf.extend_from_slice(&raw);
        }
    }

    /// Appends a tagged single-precision float, with the same zero
    /// collapsing as [`JceWriter::write_float`].
    pub fn write_float32(&mut self, tag: u8, value: f32) {
        if value.to_bits() == 0 {
            self.write_head(tag, JceType::ZeroTag);
        } else {
            self.write_head(tag, JceType::Float);
            let mut raw = [0; 4];
            B::write_f32(&mut raw, value);
            self.buf.extend_from_slice(&raw);
        }
    }

    /// Appends a tagged string, choosing `String1` for lengths up to 255
    /// bytes and `String4` beyond.
    pub fn write_string(&mut self, tag: u8, value: &str) -> Result<(), CodecError> {
        let bytes = value.as_bytes();
        if bytes.len() > self.limits.max_string_len {
            return Err(ErrorKind::LimitExceeded {
                len: bytes.len(),
                limit: self.limits.max_string_len,
            }.into());
        }
        if bytes.len() <= 255 {
            self.write_head(tag, JceType::String1);
            self.buf.push(bytes.len() as u8);
        } else {
            self.write_head(tag, JceType::String4);
            let mut raw = [0; 4];
            B::write_u32(&mut raw, bytes.len() as u32);
            self.buf.extend_from_slice(&raw);
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Appends a tagged byte array as a `SimpleList`: outer head, inner
    /// byte-marker head, tagged length, raw payload.
    pub fn write_bytes(&mut self, tag: u8, value: &[u8]) -> Result<(), CodecError> {
        if value.len() > self.limits.max_bytes_len {
            return Err(ErrorKind::LimitExceeded {
                len: value.len(),
                limit: self.limits.max_bytes_len,
            }.into());
        }
        self.write_head(tag, JceType::SimpleList);
        self.write_head(0, JceType::Int1);
        self.write_int(0, value.len() as i64);
        self.buf.extend_from_slice(value);
        Ok(())
    }

    /// Appends a tagged list: head, tagged element count, then each item
    /// written by `f` (which must emit at tag 0).
    pub fn write_list<T, F>(&mut self, tag: u8, items: &[T], mut f: F) -> Result<(), CodecError>
    where
        F: FnMut(&mut Self, &T) -> Result<(), CodecError>,
    {
        if items.len() > self.limits.max_container_len {
            return Err(ErrorKind::LimitExceeded {
                len: items.len(),
                limit: self.limits.max_container_len,
            }.into());
        }
        self.enter()?;
        self.write_head(tag, JceType::List);
        self.write_int(0, items.len() as i64);
        for item in items {
            f(self, item)?;
        }
        self.leave();
        Ok(())
    }

    /// Appends a tagged map: head, tagged pair count, then for each pair
    /// the key written by `fk` (at tag 0) and the value by `fv` (at tag
    /// 1). Pairs are emitted in the order supplied; readers must not
    /// assume any particular one.
    pub fn write_map<K, V, F, G>(
        &mut self,
        tag: u8,
        pairs: &[(K, V)],
        mut fk: F,
        mut fv: G,
    ) -> Result<(), CodecError>
    where
        F: FnMut(&mut Self, &K) -> Result<(), CodecError>,
        G: FnMut(&mut Self, &V) -> Result<(), CodecError>,
    {
        if pairs.len() > self.limits.max_container_len {
            return Err(ErrorKind::LimitExceeded {
                len: pairs.len(),
                limit: self.limits.max_container_len,
            }.into());
        }
        self.enter()?;
        self.write_head(tag, JceType::Map);
        self.write_int(0, pairs.len() as i64);
        for &(ref key, ref value) in pairs {
            fk(self, key)?;
            fv(self, value)?;
        }
        self.leave();
        Ok(())
    }

    /// Appends a tagged struct frame: `StructBegin`, the fields written by
    /// `f`, then a `StructEnd` at tag 0.
    pub fn write_struct<F>(&mut self, tag: u8, f: F) -> Result<(), CodecError>
    where
        F: FnOnce(&mut Self) -> Result<(), CodecError>,
    {
        self.enter()?;
        self.write_head(tag, JceType::StructBegin);
        f(self)?;
        self.write_head(0, JceType::StructEnd);
        self.leave();
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    fn written<F>(f: F) -> Vec<u8>
    where
        F: FnOnce(&mut JceWriter<NetworkEndian>),
    {
        let mut buf = Vec::new();
        {
            let mut w: JceWriter<NetworkEndian> = JceWriter::new(&mut buf, Limits::default());
            f(&mut w);
        }
        buf
    }

    #[test]
    fn zero_collapses_to_a_bare_head() {
        assert_eq!(written(|w| w.write_int(0, 0)), [0x0C]);
    }

    #[test]
    fn int_compaction_picks_the_smallest_width() {
        assert_eq!(written(|w| w.write_int(0, 100)), [0x00, 0x64]);
        assert_eq!(written(|w| w.write_int(0, 127)), [0x00, 0x7F]);
        assert_eq!(written(|w| w.write_int(0, -128)), [0x00, 0x80]);
        assert_eq!(written(|w| w.write_int(0, 128)), [0x01, 0x00, 0x80]);
        assert_eq!(written(|w| w.write_int(0, 32_767)), [0x01, 0x7F, 0xFF]);
        assert_eq!(written(|w| w.write_int(0, -32_768)), [0x01, 0x80, 0x00]);
        assert_eq!(
            written(|w| w.write_int(0, 32_768)),
            [0x02, 0x00, 0x00, 0x80, 0x00]
        );
        assert_eq!(
            written(|w| w.write_int(0, 2_147_483_647)),
            [0x02, 0x7F, 0xFF, 0xFF, 0xFF]
        );
        assert_eq!(
            written(|w| w.write_int(0, -2_147_483_648)),
            [0x02, 0x80, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            written(|w| w.write_int(0, 2_147_483_648)),
            [0x03, 0x00, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            written(|w| w.write_int(0, i64::max_value())),
            [0x03, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn bools_use_zero_tag_and_int1() {
        assert_eq!(written(|w| w.write_bool(3, false)), [0x3C]);
        assert_eq!(written(|w| w.write_bool(3, true)), [0x30, 0x01]);
    }

    #[test]
    fn float_zero_convention() {
        assert_eq!(written(|w| w.write_float(0, 0.0)), [0x0C]);
        assert_eq!(written(|w| w.write_float32(0, 0.0)), [0x0C]);
        // -0.0 has a sign bit set, so it keeps its payload
        assert_eq!(
            written(|w| w.write_float(0, -0.0)),
            [0x05, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            written(|w| w.write_float(1, 1.0)),
            [0x15, 0x3F, 0xF0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn string_at_tag_1() {
        assert_eq!(
            written(|w| w.write_string(1, "Alice").unwrap()),
            [0x16, 0x05, 0x41, 0x6C, 0x69, 0x63, 0x65]
        );
    }

    #[test]
    fn string_switches_to_the_wide_form_at_256() {
        let s255: String = ::std::iter::repeat('x').take(255).collect();
        let out = written(|w| w.write_string(0, &s255).unwrap());
        assert_eq!(out[0], 0x06);
        assert_eq!(out[1], 255);
        assert_eq!(out.len(), 2 + 255);

        let s256: String = ::std::iter::repeat('x').take(256).collect();
        let out = written(|w| w.write_string(0, &s256).unwrap());
        assert_eq!(out[0], 0x07);
        assert_eq!(&out[1..5], &[0x00, 0x00, 0x01, 0x00]);
        assert_eq!(out.len(), 5 + 256);
    }

    #[test]
    fn empty_string_is_a_zero_length_string1() {
        assert_eq!(written(|w| w.write_string(0, "").unwrap()), [0x06, 0x00]);
    }

    #[test]
    fn bytes_use_the_simple_list_form() {
        assert_eq!(
            written(|w| w.write_bytes(2, &[1, 2, 3]).unwrap()),
            [0x2D, 0x00, 0x00, 0x03, 0x01, 0x02, 0x03]
        );
        // empty: the length itself compacts to a ZeroTag head
        assert_eq!(written(|w| w.write_bytes(0, &[]).unwrap()), [0x0D, 0x00, 0x0C]);
    }

    #[test]
    fn simple_list_beats_the_equivalent_int_list() {
        let bytes = [1u8, 2, 3];
        let simple = written(|w| w.write_bytes(0, &bytes).unwrap());
        let list = written(|w| {
            w.write_list(0, &bytes, |w, b| {
                w.write_int(0, *b as i64);
                Ok(())
            }).unwrap()
        });
        assert!(simple.len() < list.len());
    }

    #[test]
    fn list_of_ints_matches_the_wire_layout() {
        let items = [1i64, 2, 3];
        let out = written(|w| {
            w.write_list(0, &items, |w, i| {
                w.write_int(0, *i);
                Ok(())
            }).unwrap()
        });
        assert_eq!(out, [0x09, 0x00, 0x03, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03]);
    }

    #[test]
    fn empty_containers_write_a_zero_count() {
        let items: [i64; 0] = [];
        let out = written(|w| {
            w.write_list(4, &items, |w, i| {
                w.write_int(0, *i);
                Ok(())
            }).unwrap()
        });
        assert_eq!(out, [0x49, 0x0C]);

        let pairs: [(i64, i64); 0] = [];
        let out = written(|w| {
            w.write_map(
                5,
                &pairs,
                |w, k| {
                    w.write_int(0, *k);
                    Ok(())
                },
                |w, v| {
                    w.write_int(1, *v);
                    Ok(())
                },
            ).unwrap()
        });
        assert_eq!(out, [0x58, 0x0C]);
    }

    #[test]
    fn map_pairs_keep_their_order() {
        let pairs = [(2i64, 20i64), (1, 10)];
        let out = written(|w| {
            w.write_map(
                0,
                &pairs,
                |w, k| {
                    w.write_int(0, *k);
                    Ok(())
                },
                |w, v| {
                    w.write_int(1, *v);
                    Ok(())
                },
            ).unwrap()
        });
        assert_eq!(
            out,
            [0x08, 0x00, 0x02, 0x00, 0x02, 0x10, 0x14, 0x00, 0x01, 0x10, 0x0A]
        );
    }

    #[test]
    fn struct_frames_close_with_an_end_marker_at_tag_0() {
        let out = written(|w| {
            w.write_struct(1, |w| {
                w.write_int(0, 7);
                Ok(())
            }).unwrap()
        });
        assert_eq!(out, [0x1A, 0x00, 0x07, 0x0B]);
    }

    #[test]
    fn rollback_restores_the_pre_call_length() {
        let mut buf = vec![0xAB];
        {
            let mut w: JceWriter<NetworkEndian> = JceWriter::new(&mut buf, Limits::default());
            w.write_int(0, 5);
            w.rollback();
        }
        assert_eq!(buf, [0xAB]);
    }

    #[test]
    fn container_depth_is_limited_on_encode() {
        let limits = Limits::default().with_max_depth(2);
        let mut buf = Vec::new();
        let mut w: JceWriter<NetworkEndian> = JceWriter::new(&mut buf, limits);
        let err = w
            .write_struct(0, |w| {
                w.write_struct(0, |w| w.write_struct(0, |_| Ok(())))
            })
            .unwrap_err();
        match *err.kind() {
            ErrorKind::DepthExceeded { limit: 2 } => {}
            ref other => panic!("unexpected error: {:?}", other),
        }
    }
}

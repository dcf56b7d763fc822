//! Schemaless encoding and decoding of [`TarsValue`] trees.
//!
//! This codec works from wire type codes alone: no defaults, no
//! constraints, no named fields, and integers stay in their promoted
//! 64-bit form. The top level follows the Tars payload convention: a
//! struct-shaped value is a bare sequence of tagged fields, and
//! [`decode_root`] parses the whole buffer into the corresponding
//! tag-keyed [`TarsValue::StructMap`].
//!
//! The wire erases a few distinctions, so decoding canonicalises: a bool
//! comes back as its backing integer, and any scalar encoded as `ZeroTag`
//! comes back as `Int(0)`. Round-trip identity therefore holds for
//! wire-canonical trees (no `Bool`, no zero-bit floats); everything else
//! round-trips into its canonical form.

use error::{CodecError, ErrorKind, PathSeg};
use reader::JceReader;
use value::TarsValue;
use wire::{Head, JceType};
use writer::JceWriter;

use byteorder::ByteOrder;
use std::collections::BTreeMap;

/// Parses an entire buffer as a bare struct body, yielding the tag-keyed
/// map of its fields.
pub fn decode_root<'a, B: ByteOrder>(
    r: &mut JceReader<'a, B>,
) -> Result<TarsValue, CodecError> {
    let mut map = BTreeMap::new();
    while r.has_more() {
        let head = r.read_head()?;
        if head.is_struct_end() {
            return Err(ErrorKind::TypeMismatch {
                wire: JceType::StructEnd,
                expected: "a top-level field".to_owned(),
            }.into());
        }
        if map.contains_key(&(head.tag as i64)) {
            return Err(ErrorKind::DuplicateTag { tag: head.tag }.into());
        }
        let value = decode_value(r, head).map_err(|e| e.at(PathSeg::Tag(head.tag)))?;
        map.insert(head.tag as i64, value);
    }
    Ok(TarsValue::StructMap(map))
}

/// Decodes a single value whose head has already been read.
pub(crate) fn decode_value<'a, B: ByteOrder>(
    r: &mut JceReader<'a, B>,
    head: Head,
) -> Result<TarsValue, CodecError> {
    match head.ty {
        JceType::ZeroTag => Ok(TarsValue::Int(0)),
        JceType::Int1 | JceType::Int2 | JceType::Int4 | JceType::Int8 => {
            Ok(TarsValue::Int(r.read_int(head.ty)?))
        }
        JceType::Float => Ok(TarsValue::Float(r.read_float32(head.ty)?)),
        JceType::Double => Ok(TarsValue::Double(r.read_float(head.ty)?)),
        JceType::String1 | JceType::String4 => {
            let raw = r.read_string(head.ty)?;
            let s = String::from_utf8(raw.to_vec())
                .map_err(|_| CodecError::new(ErrorKind::InvalidUtf8))?;
            Ok(TarsValue::Str(s))
        }
        JceType::SimpleList => Ok(TarsValue::Bytes(r.read_simple_list()?.to_vec())),
        JceType::List => {
            let count = r.read_list_header()?;
            r.enter()?;
            let mut items = Vec::with_capacity(count);
            for index in 0..count {
                let elem = r.read_head()?;
                let value =
                    decode_value(r, elem).map_err(|e| e.at(PathSeg::Index(index)))?;
                items.push(value);
            }
            r.leave();
            Ok(TarsValue::List(items))
        }
        JceType::Map => {
            let count = r.read_map_header()?;
            r.enter()?;
            let mut pairs = Vec::with_capacity(count);
            for index in 0..count {
                let key_head = r.read_head()?;
                expect_pair_tag(key_head, 0)?;
                let key =
                    decode_value(r, key_head).map_err(|e| e.at(PathSeg::Index(index)))?;
                let value_head = r.read_head()?;
                expect_pair_tag(value_head, 1)?;
                let value =
                    decode_value(r, value_head).map_err(|e| e.at(PathSeg::Index(index)))?;
                pairs.push((key, value));
            }
            r.leave();
            Ok(TarsValue::Map(pairs))
        }
        JceType::StructBegin => {
            let mut map = BTreeMap::new();
            r.read_struct_body(|r, field| {
                if map.contains_key(&(field.tag as i64)) {
                    return Err(ErrorKind::DuplicateTag { tag: field.tag }.into());
                }
                let value =
                    decode_value(r, field).map_err(|e| e.at(PathSeg::Tag(field.tag)))?;
                map.insert(field.tag as i64, value);
                Ok(())
            })?;
            Ok(TarsValue::StructMap(map))
        }
        JceType::StructEnd => Err(ErrorKind::TypeMismatch {
            wire: JceType::StructEnd,
            expected: "a value".to_owned(),
        }.into()),
    }
}

fn expect_pair_tag(head: Head, tag: u8) -> Result<(), CodecError> {
    if head.tag == tag {
        Ok(())
    } else {
        Err(ErrorKind::TypeMismatch {
            wire: head.ty,
            expected: format!("a map {} at tag {}", if tag == 0 { "key" } else { "value" }, tag),
        }.into())
    }
}

/// Encodes a value at the top level: a `StructMap` becomes a bare field
/// sequence, anything else a single field at tag 0 (which decodes back
/// wrapped as `StructMap{0: value}`).
pub fn encode_root<'a, B: ByteOrder>(
    w: &mut JceWriter<'a, B>,
    value: &TarsValue,
) -> Result<(), CodecError> {
    match *value {
        TarsValue::StructMap(ref map) => {
            for (&key, field) in map {
                let tag = tag_of_key(key)?;
                encode_value(w, tag, field).map_err(|e| e.at(PathSeg::Tag(tag)))?;
            }
            Ok(())
        }
        ref other => encode_value(w, 0, other),
    }
}

/// Encodes a single tagged value; nested struct-shaped maps get framed.
pub(crate) fn encode_value<'a, B: ByteOrder>(
    w: &mut JceWriter<'a, B>,
    tag: u8,
    value: &TarsValue,
) -> Result<(), CodecError> {
    match *value {
        TarsValue::Bool(v) => {
            w.write_bool(tag, v);
            Ok(())
        }
        TarsValue::Int(v) => {
            w.write_int(tag, v);
            Ok(())
        }
        TarsValue::Float(v) => {
            w.write_float32(tag, v);
            Ok(())
        }
        TarsValue::Double(v) => {
            w.write_float(tag, v);
            Ok(())
        }
        TarsValue::Str(ref v) => w.write_string(tag, v),
        TarsValue::Bytes(ref v) => w.write_bytes(tag, v),
        TarsValue::List(ref items) => {
            let mut index = 0;
            w.write_list(tag, items, |w, item| {
                let result =
                    encode_value(w, 0, item).map_err(|e| e.at(PathSeg::Index(index)));
                index += 1;
                result
            })
        }
        TarsValue::Map(ref pairs) => {
            let mut index = 0;
            w.write_map(
                tag,
                pairs,
                |w, key| encode_value(w, 0, key),
                |w, value| {
                    let result =
                        encode_value(w, 1, value).map_err(|e| e.at(PathSeg::Index(index)));
                    index += 1;
                    result
                },
            )
        }
        TarsValue::StructMap(ref map) => w.write_struct(tag, |w| {
            for (&key, field) in map {
                let field_tag = tag_of_key(key)?;
                encode_value(w, field_tag, field).map_err(|e| e.at(PathSeg::Tag(field_tag)))?;
            }
            Ok(())
        }),
    }
}

fn tag_of_key(key: i64) -> Result<u8, CodecError> {
    if key >= 0 && key <= 255 {
        Ok(key as u8)
    } else {
        Err(ErrorKind::OutOfRange {
            value: key,
            target: "a struct tag".to_owned(),
        }.into())
    }
}

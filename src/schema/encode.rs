//! Schema-driven encoding: walks the compiled fields in tag order and
//! drives the wire writer from a positional slot view.

use error::{CodecError, ErrorKind, PathSeg};
use generic;
use value::TarsValue;
use writer::JceWriter;
use super::registry::SchemaRegistry;
use super::{value_matches, CompiledField, CompiledSchema, Kind, StructOptions};

use byteorder::ByteOrder;

/// Encodes a top-level struct as a bare field sequence (the Tars payload
/// convention; nested structs get framed).
///
/// `slots` holds one entry per schema field, in field order. An unset
/// optional is skipped, an unset field with a default encodes the
/// default, and an unset required field is an error.
pub fn encode_struct<'a, B: ByteOrder>(
    w: &mut JceWriter<'a, B>,
    slots: &[Option<TarsValue>],
    schema: &CompiledSchema,
    registry: &SchemaRegistry,
) -> Result<(), CodecError> {
    if slots.len() != schema.field_count() {
        return Err(ErrorKind::Validation {
            reason: format!(
                "`{}` has {} fields, but {} slots were supplied",
                schema.name(),
                schema.field_count(),
                slots.len()
            ),
        }.into());
    }
    write_fields(w, schema, registry, |slot, _| slots[slot].as_ref())
}

/// Emits every present field in ascending tag order, resolving slot
/// values through `lookup` (positional at the top level, tag-keyed for
/// nested struct maps).
fn write_fields<'a, 'v, B, F>(
    w: &mut JceWriter<'a, B>,
    schema: &CompiledSchema,
    registry: &SchemaRegistry,
    lookup: F,
) -> Result<(), CodecError>
where
    B: ByteOrder,
    F: Fn(usize, &CompiledField) -> Option<&'v TarsValue>,
{
    for (slot, field) in schema.fields().iter().enumerate() {
        let value = match lookup(slot, field) {
            Some(value) => value,
            None => {
                if field.kind().is_optional() {
                    continue;
                }
                match field.default() {
                    Some(default) => default,
                    None => {
                        return Err(ErrorKind::MissingRequired {
                            field: field.name_arc(),
                            tag: field.tag(),
                        }.into());
                    }
                }
            }
        };
        if schema.options().contains(StructOptions::OMIT_DEFAULTS) {
            if let Some(default) = field.default() {
                if value.bit_eq(default) {
                    continue;
                }
            }
        }
        write_value(w, field.tag(), field.kind(), value, registry)
            .map_err(|e| e.at(PathSeg::Field(field.name_arc())))?;
    }
    Ok(())
}

/// Emits one tagged value according to its declared kind.
fn write_value<'a, B: ByteOrder>(
    w: &mut JceWriter<'a, B>,
    tag: u8,
    kind: &Kind,
    value: &TarsValue,
    registry: &SchemaRegistry,
) -> Result<(), CodecError> {
    match *kind {
        Kind::Optional(ref inner) => write_value(w, tag, inner, value, registry),
        Kind::Bool => match *value {
            TarsValue::Bool(v) => {
                w.write_bool(tag, v);
                Ok(())
            }
            ref other => mismatch(kind, other),
        },
        Kind::Int(width) | Kind::Enum(width, _) => match *value {
            TarsValue::Int(v) => {
                if !width.contains(v) {
                    return Err(ErrorKind::OutOfRange {
                        value: v,
                        target: width.name().to_owned(),
                    }.into());
                }
                w.write_int(tag, v);
                Ok(())
            }
            ref other => mismatch(kind, other),
        },
        Kind::Float => match *value {
            TarsValue::Float(v) => {
                w.write_float32(tag, v);
                Ok(())
            }
            ref other => mismatch(kind, other),
        },
        Kind::Double => match *value {
            TarsValue::Double(v) => {
                w.write_float(tag, v);
                Ok(())
            }
            TarsValue::Float(v) => {
                w.write_float(tag, v as f64);
                Ok(())
            }
            ref other => mismatch(kind, other),
        },
        Kind::Str => match *value {
            TarsValue::Str(ref s) => w.write_string(tag, s),
            ref other => mismatch(kind, other),
        },
        Kind::Bytes => match *value {
            TarsValue::Bytes(ref b) => w.write_bytes(tag, b),
            ref other => mismatch(kind, other),
        },
        Kind::List(ref elem) | Kind::Set(ref elem) => match *value {
            TarsValue::List(ref items) => {
                let mut index = 0;
                w.write_list(tag, items, |w, item| {
                    let result = write_value(w, 0, elem, item, registry)
                        .map_err(|e| e.at(PathSeg::Index(index)));
                    index += 1;
                    result
                })
            }
            ref other => mismatch(kind, other),
        },
        Kind::Tuple(ref kinds) => match *value {
            TarsValue::List(ref items) => {
                if items.len() != kinds.len() {
                    return Err(ErrorKind::Validation {
                        reason: format!(
                            "tuple declares {} elements, value has {}",
                            kinds.len(),
                            items.len()
                        ),
                    }.into());
                }
                let mut index = 0;
                w.write_list(tag, items, |w, item| {
                    let result = write_value(w, 0, &kinds[index], item, registry)
                        .map_err(|e| e.at(PathSeg::Index(index)));
                    index += 1;
                    result
                })
            }
            ref other => mismatch(kind, other),
        },
        Kind::Map(ref key_kind, ref value_kind) => match *value {
            TarsValue::Map(ref pairs) => {
                let mut index = 0;
                w.write_map(
                    tag,
                    pairs,
                    |w, key| write_value(w, 0, key_kind, key, registry),
                    |w, val| {
                        let result = write_value(w, 1, value_kind, val, registry)
                            .map_err(|e| e.at(PathSeg::Index(index)));
                        index += 1;
                        result
                    },
                )
            }
            ref other => mismatch(kind, other),
        },
        Kind::Struct(id) => match *value {
            TarsValue::StructMap(ref map) => {
                let child = registry.get(id)?;
                for &key in map.keys() {
                    if key < 0 || key > 255 {
                        return Err(ErrorKind::OutOfRange {
                            value: key,
                            target: "a struct tag".to_owned(),
                        }.into());
                    }
                    if child.slot_of_tag(key as u8).is_none() {
                        return Err(ErrorKind::Validation {
                            reason: format!(
                                "value carries tag {} not declared by `{}`",
                                key,
                                child.name()
                            ),
                        }.into());
                    }
                }
                w.write_struct(tag, |w| {
                    write_fields(w, &child, registry, |_, field| {
                        map.get(&(field.tag() as i64))
                    })
                })
            }
            ref other => mismatch(kind, other),
        },
        Kind::Union(ref variants) => {
            for variant in variants {
                if value_matches(variant, value) {
                    return write_value(w, tag, variant, value, registry);
                }
            }
            Err(ErrorKind::Validation {
                reason: format!("no variant of {} matches a {}", kind.describe(), value.kind_name()),
            }.into())
        }
        Kind::Any => generic::encode_value(w, tag, value),
    }
}

fn mismatch(kind: &Kind, value: &TarsValue) -> Result<(), CodecError> {
    Err(ErrorKind::Validation {
        reason: format!(
            "a {} cannot be encoded as {}",
            value.kind_name(),
            kind.describe()
        ),
    }.into())
}

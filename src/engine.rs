//! Top-level entry points.
//!
//! These functions operate against the process-wide schema registry and
//! use the protocol's default big-endian byte order. Embedders that need a
//! private registry can call the `*_in` variants; callers that need the
//! little-endian specialisation drive `JceReader`/`JceWriter` and the
//! `generic` layer directly.
//!
//! Everything here is pure apart from allocation and registry writes. On
//! an encode error the output buffer is discarded; decoding returns on the
//! first error.

use error::CodecError;
use generic;
use limits::Limits;
use probe::{self, TraceNode};
use reader::JceReader;
use schema::registry::{default_registry, SchemaId, SchemaRegistry};
use schema::{decode as schema_decode, encode as schema_encode, StructDescriptor};
use value::TarsValue;
use writer::JceWriter;

use byteorder::NetworkEndian;

/// Compiles and registers a schema in the process-wide registry.
pub fn register_schema(desc: StructDescriptor) -> Result<SchemaId, CodecError> {
    default_registry().register(desc)
}

/// Reserves an id in the process-wide registry for a schema defined
/// later; this is how self-referential types obtain their own id.
pub fn reserve_schema() -> SchemaId {
    default_registry().reserve()
}

/// Fills a reserved id in the process-wide registry.
pub fn define_schema(id: SchemaId, desc: StructDescriptor) -> Result<(), CodecError> {
    default_registry().define(id, desc)
}

/// Encodes a slot view (one entry per schema field) against a registered
/// schema, producing the bare top-level field sequence.
pub fn encode(
    slots: &[Option<TarsValue>],
    id: SchemaId,
    limits: Limits,
) -> Result<Vec<u8>, CodecError> {
    encode_in(default_registry(), slots, id, limits)
}

/// Like `encode`, against a caller-owned registry.
pub fn encode_in(
    registry: &SchemaRegistry,
    slots: &[Option<TarsValue>],
    id: SchemaId,
    limits: Limits,
) -> Result<Vec<u8>, CodecError> {
    let schema = registry.get(id)?;
    let mut buf = Vec::new();
    {
        let mut w: JceWriter<NetworkEndian> = JceWriter::new(&mut buf, limits);
        if let Err(e) = schema_encode::encode_struct(&mut w, slots, &schema, registry) {
            w.rollback();
            return Err(e);
        }
    }
    Ok(buf)
}

/// Decodes bytes against a registered schema, returning the filled slot
/// view (defaults applied; only defaultless optional slots stay `None`).
pub fn decode(
    bytes: &[u8],
    id: SchemaId,
    limits: Limits,
) -> Result<Vec<Option<TarsValue>>, CodecError> {
    decode_in(default_registry(), bytes, id, limits)
}

/// Like `decode`, against a caller-owned registry.
pub fn decode_in(
    registry: &SchemaRegistry,
    bytes: &[u8],
    id: SchemaId,
    limits: Limits,
) -> Result<Vec<Option<TarsValue>>, CodecError> {
    let schema = registry.get(id)?;
    let mut r: JceReader<NetworkEndian> = JceReader::new(bytes, limits);
    schema_decode::decode_struct(&mut r, &schema, registry)
}

/// Schemaless encode. A `StructMap` root becomes a bare field sequence;
/// any other root is emitted as a single field at tag 0.
pub fn encode_generic(value: &TarsValue, limits: Limits) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    {
        let mut w: JceWriter<NetworkEndian> = JceWriter::new(&mut buf, limits);
        if let Err(e) = generic::encode_root(&mut w, value) {
            w.rollback();
            return Err(e);
        }
    }
    Ok(buf)
}

/// Schemaless decode: parses the whole buffer as a bare struct body and
/// returns the tag-keyed map of its fields.
pub fn decode_generic(bytes: &[u8], limits: Limits) -> Result<TarsValue, CodecError> {
    let mut r: JceReader<NetworkEndian> = JceReader::new(bytes, limits);
    generic::decode_root(&mut r)
}

/// Whether `bytes` parses completely as a JCE struct; returns the decoded
/// tag-keyed value when it does.
pub fn probe_struct(bytes: &[u8], limits: Limits) -> Option<TarsValue> {
    probe::probe::<NetworkEndian>(bytes, limits)
}

/// Produces a diagnostic trace tree of `bytes`, annotated with field
/// names when a registered schema is given. Never fails; malformed
/// regions are recorded in the tree.
pub fn decode_trace(bytes: &[u8], schema: Option<SchemaId>, limits: Limits) -> TraceNode {
    let registry = default_registry();
    let compiled = schema.and_then(|id| registry.get(id).ok());
    probe::trace::<NetworkEndian>(
        bytes,
        compiled.as_ref().map(|arc| &**arc),
        registry,
        limits,
    )
}

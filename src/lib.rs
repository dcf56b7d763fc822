//! Implementation of Tencent's Tars/JCE binary serialization protocol.
//!
//! JCE is a self-describing tag-type-value format: every field on the wire
//! carries a one- or two-byte head naming its tag (0..=255) and wire type,
//! followed by the value. This crate implements the payload codec only:
//!
//! * `reader`/`writer` are the wire-level layer (heads, integer
//!   compaction, `ZeroTag`, `SimpleList`).
//! * `schema` compiles declarative field descriptions into tag-routing
//!   tables and drives schema-aware encode/decode with defaults and
//!   constraints.
//! * `generic` round-trips tag-keyed value maps without any schema.
//! * `probe` recognises complete JCE structs in opaque byte blobs and
//!   produces diagnostic trace trees.
//!
//! The functions in `engine` (re-exported at the crate root) tie these
//! together against a process-wide schema registry and use the protocol's
//! default big-endian byte order.

//#![doc(html_root_url = "https://docs.rs/jce-proto/0.1.0")]
#![warn(missing_debug_implementations)]

#[macro_use] extern crate log;
#[macro_use] extern crate num_derive;
#[macro_use] extern crate failure;
#[macro_use] extern crate bitflags;
extern crate num_traits;
extern crate byteorder;
extern crate once_cell;
extern crate parking_lot;
#[cfg(test)] extern crate rand;

pub mod error;
pub mod limits;
pub mod value;
pub mod wire;
pub mod reader;
pub mod writer;
pub mod schema;
pub mod generic;
pub mod probe;
pub mod engine;

pub use engine::*;
pub use error::{CodecError, ErrorKind, FieldPath, PathSeg};
pub use limits::Limits;
pub use probe::TraceNode;
pub use reader::JceReader;
pub use schema::{Bound, CompiledField, CompiledSchema, Constraint, FieldDef, IntWidth, Kind,
                 Matcher, SchemaId, SchemaRegistry, StructDescriptor, StructOptions};
pub use value::TarsValue;
pub use wire::{Head, JceType};
pub use writer::JceWriter;

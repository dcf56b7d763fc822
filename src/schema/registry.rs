//! Registration and lookup of compiled schemas.
//!
//! Schemas refer to each other by [`SchemaId`] — an index into a registry —
//! rather than by owning pointers, which keeps self-referential and
//! mutually recursive types expressible without ownership knots. The
//! registry lock is read-optimised: lookups never block each other, and
//! the write lock is held only while a schema is registered.

use error::{CodecError, ErrorKind};
use super::{compile, CompiledSchema, StructDescriptor};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Identifies a schema registered in a [`SchemaRegistry`].
///
/// Ids are local to the registry that issued them and are never reused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaId {
    val: u32,
}

impl SchemaId {
    /// The raw index inside this id.
    pub fn value(&self) -> u32 {
        self.val
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.val)
    }
}

/// Holds compiled schemas, keyed by [`SchemaId`].
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    slots: RwLock<Vec<Option<Arc<CompiledSchema>>>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        SchemaRegistry {
            slots: RwLock::new(Vec::new()),
        }
    }

    /// Compiles and registers a descriptor, returning its id.
    pub fn register(&self, desc: StructDescriptor) -> Result<SchemaId, CodecError> {
        let compiled = Arc::new(compile(desc)?);
        let mut slots = self.slots.write();
        let id = SchemaId { val: slots.len() as u32 };
        debug!("registered schema `{}` as {}", compiled.name(), id);
        slots.push(Some(compiled));
        Ok(id)
    }

    /// Reserves an id whose schema will be supplied later via
    /// [`SchemaRegistry::define`]. This is how a self-referential type
    /// obtains the id it needs inside its own field kinds.
    ///
    /// The reservation must be defined before the first encode or decode
    /// that reaches it.
    pub fn reserve(&self) -> SchemaId {
        let mut slots = self.slots.write();
        let id = SchemaId { val: slots.len() as u32 };
        slots.push(None);
        id
    }

    /// Fills a reserved id. Defining an id twice is an error; schemas are
    /// immutable once registered.
    pub fn define(&self, id: SchemaId, desc: StructDescriptor) -> Result<(), CodecError> {
        let compiled = Arc::new(compile(desc)?);
        let mut slots = self.slots.write();
        match slots.get_mut(id.value() as usize) {
            Some(slot) => {
                if slot.is_some() {
                    return Err(ErrorKind::Validation {
                        reason: format!("schema {} is already defined", id),
                    }.into());
                }
                debug!("defined reserved schema `{}` as {}", compiled.name(), id);
                *slot = Some(compiled);
                Ok(())
            }
            None => Err(ErrorKind::UnknownSchema { id: id.value() }.into()),
        }
    }

    /// Looks up a schema. Fails for ids from other registries and for
    /// reservations that were never defined.
    pub fn get(&self, id: SchemaId) -> Result<Arc<CompiledSchema>, CodecError> {
        self.slots
            .read()
            .get(id.value() as usize)
            .and_then(|slot| slot.clone())
            .ok_or_else(|| ErrorKind::UnknownSchema { id: id.value() }.into())
    }

    /// Number of issued ids (defined or reserved).
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Whether no ids have been issued yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static DEFAULT_REGISTRY: Lazy<SchemaRegistry> = Lazy::new(SchemaRegistry::new);

/// The process-wide registry backing the top-level entry points.
pub fn default_registry() -> &'static SchemaRegistry {
    &DEFAULT_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::{FieldDef, IntWidth, Kind};

    #[test]
    fn register_and_get() {
        let registry = SchemaRegistry::new();
        let id = registry
            .register(StructDescriptor::new("Ping").field(FieldDef::new(
                "seq",
                0,
                Kind::Int(IntWidth::W32),
            )))
            .unwrap();
        assert_eq!(registry.get(id).unwrap().name(), "Ping");
    }

    #[test]
    fn undefined_reservation_fails_lookup() {
        let registry = SchemaRegistry::new();
        let id = registry.reserve();
        match *registry.get(id).unwrap_err().kind() {
            ErrorKind::UnknownSchema { .. } => {}
            ref other => panic!("unexpected error: {:?}", other),
        }

        registry
            .define(id, StructDescriptor::new("Node"))
            .unwrap();
        assert_eq!(registry.get(id).unwrap().name(), "Node");
    }

    #[test]
    fn double_define_is_rejected() {
        let registry = SchemaRegistry::new();
        let id = registry.reserve();
        registry.define(id, StructDescriptor::new("A")).unwrap();
        assert!(registry.define(id, StructDescriptor::new("B")).is_err());
    }

    #[test]
    fn foreign_ids_do_not_resolve() {
        let a = SchemaRegistry::new();
        let b = SchemaRegistry::new();
        let id = a.register(StructDescriptor::new("OnlyInA")).unwrap();
        assert!(b.get(id).is_err());
    }

    #[test]
    fn lookups_proceed_concurrently() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(SchemaRegistry::new());
        let id = registry
            .register(StructDescriptor::new("Shared").field(FieldDef::new(
                "n",
                0,
                Kind::Int(IntWidth::W64),
            )))
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let registry = registry.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    assert_eq!(registry.get(id).unwrap().name(), "Shared");
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }
}

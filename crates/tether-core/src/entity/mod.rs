//! Content node data model and external collaborator traits.
//!
//! - [`node`] — [`ContentNode`] and its field value model.
//! - [`storage`] — the [`EntityStorage`] collaborator plus the in-memory
//!   implementation used by fixtures and tests.
//! - [`modules`] — the [`ModuleRegistry`] collaborator mapping entity types
//!   to the modules that provide them.

pub mod modules;
pub mod node;
pub mod storage;

pub use modules::{ModuleRegistry, StaticModuleRegistry};
pub use node::{ContentNode, EntityUuid, FieldMap, FieldValue, LinkValue, NodeValues, ReferenceTarget};
pub use storage::{EntityStorage, MemoryStorage};

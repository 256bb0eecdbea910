//! tether-core library.
//!
//! Computes the full transitive dependency closure of a content entity: every
//! other entity, and every module requirement, that must exist for the entity
//! to be valid, exportable, or re-creatable elsewhere.
//!
//! # Components
//!
//! - [`entity`] — content node data model plus the storage and
//!   module-registry collaborator traits.
//! - [`wrapper`] — [`DependentWrapper`]: the per-node snapshot (identity,
//!   content hash, edge lists) used in place of a live node during graph
//!   computation.
//! - [`stack`] — [`DependencyStack`]: the per-run registry bridging to the
//!   persistent cache; the sole cycle guard.
//! - [`cache`] — the persistent, uuid-keyed wrapper snapshot store.
//! - [`calculator`] — [`DependencyCalculator`]: the recursive closure
//!   algorithm.
//! - [`event`] — the collector extension protocol contributing graph edges.
//!
//! # Conventions
//!
//! - **Errors**: per-module `thiserror` enums, each mapping to a
//!   machine-readable [`error::ErrorCode`].
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).
//! - **Hashes**: BLAKE3 over canonical JSON, formatted `blake3:<hex>`.

pub mod cache;
pub mod calculator;
pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod hash;
pub mod stack;
pub mod wrapper;

pub use cache::{DependencyCache, MemoryCache, SqliteCache, WrapperSnapshot};
pub use calculator::{CalcError, DependencyCalculator, DependencyClosure};
pub use entity::{
    ContentNode, EntityStorage, EntityUuid, FieldValue, MemoryStorage, ModuleRegistry, NodeValues,
    StaticModuleRegistry,
};
pub use event::{DependencyCollector, DependencyEvent, merge_dependencies};
pub use stack::{DependencyStack, MissingDependencyError};
pub use wrapper::{DependentWrapper, IdentityError, WrapperHandle};

//! Persistent wrapper snapshot cache.
//!
//! The cache is a derived, uuid-keyed store of per-node closure snapshots
//! (hash + dependency maps + module set). It is not authoritative — live
//! content is the source of truth — but it lets warm runs skip collector
//! invocation entirely. Entries are written only for permanent stack
//! entries, and a stale entry self-heals on read via the calculator's
//! recomputation path, so concurrent last-writer-wins races are tolerated
//! without locking.
//!
//! - [`MemoryCache`] — shared in-memory map for tests and cacheless runs.
//! - [`SqliteCache`] — SQLite-backed store for real deployments.

pub mod sqlite;

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::entity::EntityUuid;
use crate::error::ErrorCode;

pub use sqlite::SqliteCache;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by cache backends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// A stored snapshot could not be decoded.
    #[error("cache entry for {uuid} is corrupted: {message}")]
    Corrupted {
        /// The uuid whose entry failed to decode.
        uuid: EntityUuid,
        /// Decoder error detail.
        message: String,
    },

    /// The backend failed to read or write.
    #[error("cache i/o failed: {0}")]
    Io(String),
}

impl CacheError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Corrupted { .. } => ErrorCode::CacheCorrupted,
            Self::Io(_) => ErrorCode::CacheIoFailed,
        }
    }
}

// ---------------------------------------------------------------------------
// WrapperSnapshot
// ---------------------------------------------------------------------------

/// The persisted form of a wrapper: identity, fingerprint, edge lists, and
/// module requirements. Round-trips through serde.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapperSnapshot {
    /// Entity type discriminator.
    pub entity_type_id: String,
    /// Local storage id.
    pub id: String,
    /// Portable identity — the cache key.
    pub uuid: EntityUuid,
    /// Content fingerprint at snapshot time.
    pub hash: String,
    /// Full resolved dependency set, uuid → hash.
    pub dependencies: BTreeMap<EntityUuid, String>,
    /// Direct-edge subset of `dependencies`.
    pub child_dependencies: BTreeMap<EntityUuid, String>,
    /// Module requirements of this node and everything reachable from it.
    pub modules: BTreeSet<String>,
    /// Out-of-band processing flag surfaced to callers.
    pub additional_processing: bool,
}

// ---------------------------------------------------------------------------
// DependencyCache
// ---------------------------------------------------------------------------

/// The persistent cache collaborator.
///
/// `get_multiple` returns a partial mapping — absent uuids are simply not
/// present in the result; only the dependency stack's bulk lookup turns a
/// partial answer into an error.
pub trait DependencyCache {
    /// Look up one snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend fails; a plain miss is `Ok(None)`.
    fn get(&self, uuid: &EntityUuid) -> Result<Option<WrapperSnapshot>, CacheError>;

    /// Look up many snapshots at once; misses are omitted from the result.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend fails.
    fn get_multiple(
        &self,
        uuids: &[EntityUuid],
    ) -> Result<BTreeMap<EntityUuid, WrapperSnapshot>, CacheError>;

    /// Store a snapshot under `uuid`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend fails.
    fn set(&self, uuid: &EntityUuid, snapshot: &WrapperSnapshot) -> Result<(), CacheError>;

    /// Drop every persisted snapshot. Operator-facing full invalidation.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend fails.
    fn delete_all_permanent(&self) -> Result<(), CacheError>;
}

// ---------------------------------------------------------------------------
// MemoryCache
// ---------------------------------------------------------------------------

/// In-memory cache backend.
///
/// Cloning shares the underlying map, so two sequential "runs" can exercise
/// warm-cache behavior against one store (the crate is single-threaded; see
/// the concurrency notes on [`crate::calculator`]).
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Rc<RefCell<BTreeMap<EntityUuid, WrapperSnapshot>>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether the cache holds no snapshots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Remove one entry. Used by tests to simulate partial invalidation.
    pub fn delete(&self, uuid: &EntityUuid) -> bool {
        self.entries.borrow_mut().remove(uuid).is_some()
    }
}

impl DependencyCache for MemoryCache {
    fn get(&self, uuid: &EntityUuid) -> Result<Option<WrapperSnapshot>, CacheError> {
        Ok(self.entries.borrow().get(uuid).cloned())
    }

    fn get_multiple(
        &self,
        uuids: &[EntityUuid],
    ) -> Result<BTreeMap<EntityUuid, WrapperSnapshot>, CacheError> {
        let entries = self.entries.borrow();
        Ok(uuids
            .iter()
            .filter_map(|uuid| entries.get(uuid).map(|snap| (uuid.clone(), snap.clone())))
            .collect())
    }

    fn set(&self, uuid: &EntityUuid, snapshot: &WrapperSnapshot) -> Result<(), CacheError> {
        self.entries
            .borrow_mut()
            .insert(uuid.clone(), snapshot.clone());
        Ok(())
    }

    fn delete_all_permanent(&self) -> Result<(), CacheError> {
        self.entries.borrow_mut().clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Per-run dependency registry.
//!
//! The stack is the single source of truth for "which wrappers exist in
//! this run". Every uuid maps to exactly one [`WrapperHandle`], so two
//! entities depending on the same third node share one wrapper and see
//! each other's enrichment. Entries carry a permanence flag: permanent
//! entries are fully resolved and eligible for the persistent cache,
//! non-permanent ones exist to terminate cycles while their closure is
//! still being computed.
//!
//! The stack bridges the run and the cache. Reads fall through to the
//! cache on a registry miss (hydrated entries arrive permanent, since only
//! fully resolved wrappers are ever persisted); writes to the cache are
//! batched via [`DependencyStack::persist_permanent`]. Cache backend
//! failures degrade to warnings — the run recomputes instead of dying.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::cache::{DependencyCache, MemoryCache, WrapperSnapshot};
use crate::entity::EntityUuid;
use crate::error::ErrorCode;
use crate::wrapper::WrapperHandle;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A recorded dependency could not be resolved from the stack or cache.
///
/// Signals staleness: a cached wrapper names a uuid whose own entry has
/// since been evicted. The calculator treats this as a cue to recompute
/// from live content rather than as a fatal condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dependency {uuid} is not present in the stack or the cache")]
pub struct MissingDependencyError {
    /// The first uuid that failed to resolve.
    pub uuid: EntityUuid,
}

impl MissingDependencyError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::MissingDependency
    }
}

// ---------------------------------------------------------------------------
// DependencyStack
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StackEntry {
    wrapper: WrapperHandle,
    permanent: bool,
}

/// Run-scoped wrapper registry backed by a persistent cache.
pub struct DependencyStack {
    entries: HashMap<EntityUuid, StackEntry>,
    cache: Box<dyn DependencyCache>,
}

impl DependencyStack {
    /// Create a stack over the given cache backend.
    #[must_use]
    pub fn new(cache: Box<dyn DependencyCache>) -> Self {
        Self {
            entries: HashMap::new(),
            cache,
        }
    }

    /// Create a stack over a fresh in-memory cache. Handy for tests and
    /// cacheless runs.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryCache::new()))
    }

    /// Whether `uuid` is registered in this run (permanent or not).
    ///
    /// Deliberately does not consult the cache: a cached-but-unregistered
    /// uuid still needs stack registration before it can participate in
    /// the run.
    #[must_use]
    pub fn has_dependency(&self, uuid: &EntityUuid) -> bool {
        self.entries.contains_key(uuid)
    }

    /// Whether `uuid` is registered and fully resolved.
    #[must_use]
    pub fn is_permanent(&self, uuid: &EntityUuid) -> bool {
        self.entries.get(uuid).is_some_and(|entry| entry.permanent)
    }

    /// Look up one wrapper, falling through to the cache on a registry
    /// miss. Returns in-flight (non-permanent) entries too, which is what
    /// terminates dependency cycles.
    pub fn get_dependency(&mut self, uuid: &EntityUuid) -> Option<WrapperHandle> {
        if let Some(entry) = self.entries.get(uuid) {
            return Some(entry.wrapper.clone());
        }
        match self.cache.get(uuid) {
            Ok(Some(snapshot)) => Some(self.hydrate(snapshot)),
            Ok(None) => None,
            Err(e) => {
                warn!(uuid = %uuid, error = %e, "cache read failed; treating as a miss");
                None
            }
        }
    }

    /// Register a wrapper under its uuid, replacing any previous record.
    ///
    /// Replacement is what lets the calculator's staleness recovery swap a
    /// hydrated-but-untrustworthy record for a freshly built wrapper (and
    /// demote it to provisional until collection finishes).
    pub fn add_dependency(&mut self, wrapper: WrapperHandle, permanent: bool) {
        let uuid = wrapper.uuid();
        self.entries.insert(uuid, StackEntry { wrapper, permanent });
    }

    /// Resolve every uuid to a wrapper, hydrating registry misses from the
    /// cache in one bulk read.
    ///
    /// # Errors
    ///
    /// Returns [`MissingDependencyError`] naming the first uuid found in
    /// neither the stack nor the cache.
    pub fn get_dependencies_by_uuid(
        &mut self,
        uuids: &[EntityUuid],
    ) -> Result<BTreeMap<EntityUuid, WrapperHandle>, MissingDependencyError> {
        let mut resolved = BTreeMap::new();
        let mut misses = Vec::new();
        for uuid in uuids {
            if let Some(entry) = self.entries.get(uuid) {
                resolved.insert(uuid.clone(), entry.wrapper.clone());
            } else {
                misses.push(uuid.clone());
            }
        }

        if !misses.is_empty() {
            let cached = match self.cache.get_multiple(&misses) {
                Ok(cached) => cached,
                Err(e) => {
                    warn!(error = %e, "bulk cache read failed; treating all as misses");
                    BTreeMap::new()
                }
            };
            for uuid in &misses {
                match cached.get(uuid) {
                    Some(snapshot) => {
                        resolved.insert(uuid.clone(), self.hydrate(snapshot.clone()));
                    }
                    None => {
                        return Err(MissingDependencyError { uuid: uuid.clone() });
                    }
                }
            }
        }
        Ok(resolved)
    }

    /// Write every permanent entry's snapshot to the cache. Backend
    /// failures are logged and skipped so one bad write cannot poison the
    /// run's in-memory result.
    pub fn persist_permanent(&self) {
        for (uuid, entry) in &self.entries {
            if !entry.permanent {
                continue;
            }
            let snapshot = entry.wrapper.snapshot();
            if let Err(e) = self.cache.set(uuid, &snapshot) {
                warn!(uuid = %uuid, error = %e, "failed to persist cache entry");
            }
        }
    }

    /// Number of registered wrappers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the run has registered no wrappers yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn hydrate(&mut self, snapshot: WrapperSnapshot) -> WrapperHandle {
        let uuid = snapshot.uuid.clone();
        let wrapper = WrapperHandle::from_snapshot(snapshot);
        self.entries.insert(
            uuid,
            StackEntry {
                wrapper: wrapper.clone(),
                permanent: true,
            },
        );
        wrapper
    }
}

impl std::fmt::Debug for DependencyStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyStack")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Entity wrappers: the per-node snapshot used during graph computation.
//!
//! The live node is thrown away at construction and just the bare minimum
//! needed to reconstruct it is kept (identity plus an eagerly computed
//! content hash), reducing memory overhead while the closure is resolved.
//! Identity and hash are immutable; the dependency and module sets are
//! append-only during one resolution pass.
//!
//! Within one run every uuid has exactly one wrapper, aliased between the
//! stack, the calculator, and collectors through [`WrapperHandle`] — an
//! `Rc<RefCell<_>>` handle, safe because resolution is single-threaded and
//! single-writer (see [`crate::calculator`]).

use std::cell::{Ref, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::cache::WrapperSnapshot;
use crate::entity::{ContentNode, EntityStorage, EntityUuid};
use crate::error::ErrorCode;
use crate::hash::content_hash;
use crate::stack::{DependencyStack, MissingDependencyError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The node has no portable unique identifier.
///
/// Fatal: a wrapper without a uuid could not be referenced consistently
/// anywhere else in the graph, which indicates malformed content rather
/// than a transient condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "entity ({entity_type_id}, {id}) has no uuid; this indicates a larger problem \
     with the content and should be remedied before calculating dependencies"
)]
pub struct IdentityError {
    /// Entity type of the offending node.
    pub entity_type_id: String,
    /// Local id of the offending node.
    pub id: String,
}

impl IdentityError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::MissingIdentifier
    }
}

// ---------------------------------------------------------------------------
// DependentWrapper
// ---------------------------------------------------------------------------

/// One graph node's identity, fingerprint, edge lists, and module needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentWrapper {
    entity_type_id: String,
    id: String,
    uuid: EntityUuid,
    hash: String,
    dependencies: BTreeMap<EntityUuid, String>,
    child_dependencies: BTreeMap<EntityUuid, String>,
    modules: BTreeSet<String>,
    additional_processing: bool,
}

impl DependentWrapper {
    /// Construct a wrapper from a live node, computing the content hash
    /// eagerly.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] if the node has no uuid.
    pub fn new(node: &ContentNode, storage: &dyn EntityStorage) -> Result<Self, IdentityError> {
        Self::with_additional_processing(node, storage, false)
    }

    /// Like [`Self::new`], flagging the node for out-of-band handling.
    /// The flag is surfaced to callers and has no effect on the graph
    /// algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] if the node has no uuid.
    pub fn with_additional_processing(
        node: &ContentNode,
        storage: &dyn EntityStorage,
        additional_processing: bool,
    ) -> Result<Self, IdentityError> {
        let uuid = node.uuid.clone().ok_or_else(|| IdentityError {
            entity_type_id: node.entity_type_id.clone(),
            id: node.id.clone(),
        })?;
        Ok(Self {
            entity_type_id: node.entity_type_id.clone(),
            id: node.id.clone(),
            uuid,
            hash: content_hash(node, storage),
            dependencies: BTreeMap::new(),
            child_dependencies: BTreeMap::new(),
            modules: BTreeSet::new(),
            additional_processing,
        })
    }

    /// Entity type discriminator.
    #[must_use]
    pub fn entity_type_id(&self) -> &str {
        &self.entity_type_id
    }

    /// Local storage id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Portable identity — the graph key.
    #[must_use]
    pub const fn uuid(&self) -> &EntityUuid {
        &self.uuid
    }

    /// Content fingerprint computed at construction.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Full dependency set, uuid → hash. Never contains this wrapper.
    #[must_use]
    pub const fn dependencies(&self) -> &BTreeMap<EntityUuid, String> {
        &self.dependencies
    }

    /// Direct-edge subset of [`Self::dependencies`].
    #[must_use]
    pub const fn child_dependencies(&self) -> &BTreeMap<EntityUuid, String> {
        &self.child_dependencies
    }

    /// Module requirements merged so far.
    #[must_use]
    pub const fn modules(&self) -> &BTreeSet<String> {
        &self.modules
    }

    /// Whether the node needs out-of-band processing.
    #[must_use]
    pub const fn additional_processing(&self) -> bool {
        self.additional_processing
    }

    /// Merge module requirements into this wrapper, deduplicating.
    pub fn add_module_dependencies(&mut self, modules: impl IntoIterator<Item = String>) {
        self.modules.extend(modules);
    }

    /// The serializable form persisted by the cache.
    #[must_use]
    pub fn snapshot(&self) -> WrapperSnapshot {
        WrapperSnapshot {
            entity_type_id: self.entity_type_id.clone(),
            id: self.id.clone(),
            uuid: self.uuid.clone(),
            hash: self.hash.clone(),
            dependencies: self.dependencies.clone(),
            child_dependencies: self.child_dependencies.clone(),
            modules: self.modules.clone(),
            additional_processing: self.additional_processing,
        }
    }

    /// Rehydrate a wrapper from a cached snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: WrapperSnapshot) -> Self {
        Self {
            entity_type_id: snapshot.entity_type_id,
            id: snapshot.id,
            uuid: snapshot.uuid,
            hash: snapshot.hash,
            dependencies: snapshot.dependencies,
            child_dependencies: snapshot.child_dependencies,
            modules: snapshot.modules,
            additional_processing: snapshot.additional_processing,
        }
    }
}

// ---------------------------------------------------------------------------
// WrapperHandle
// ---------------------------------------------------------------------------

/// Shared single-writer handle to a wrapper.
#[derive(Debug, Clone)]
pub struct WrapperHandle(Rc<RefCell<DependentWrapper>>);

impl WrapperHandle {
    /// Wrap a freshly constructed wrapper.
    #[must_use]
    pub fn new(wrapper: DependentWrapper) -> Self {
        Self(Rc::new(RefCell::new(wrapper)))
    }

    /// Rehydrate a handle from a cached snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: WrapperSnapshot) -> Self {
        Self::new(DependentWrapper::from_snapshot(snapshot))
    }

    /// Immutable view of the wrapper. Keep the borrow short-lived; the
    /// graph walk re-borrows handles at every step.
    #[must_use]
    pub fn get(&self) -> Ref<'_, DependentWrapper> {
        self.0.borrow()
    }

    /// The wrapper's uuid.
    #[must_use]
    pub fn uuid(&self) -> EntityUuid {
        self.0.borrow().uuid.clone()
    }

    /// The wrapper's content hash.
    #[must_use]
    pub fn hash(&self) -> String {
        self.0.borrow().hash.clone()
    }

    /// Snapshot of the current dependency set.
    #[must_use]
    pub fn dependencies(&self) -> BTreeMap<EntityUuid, String> {
        self.0.borrow().dependencies.clone()
    }

    /// Snapshot of the current module set.
    #[must_use]
    pub fn modules(&self) -> BTreeSet<String> {
        self.0.borrow().modules.clone()
    }

    /// Merge module requirements into the wrapper.
    pub fn add_module_dependencies(&self, modules: impl IntoIterator<Item = String>) {
        self.0.borrow_mut().add_module_dependencies(modules);
    }

    /// The serializable form persisted by the cache.
    #[must_use]
    pub fn snapshot(&self) -> WrapperSnapshot {
        self.0.borrow().snapshot()
    }

    /// Reload the live node this wrapper was built from.
    #[must_use]
    pub fn load_entity(&self, storage: &dyn EntityStorage) -> Option<ContentNode> {
        let inner = self.0.borrow();
        storage.load(&inner.entity_type_id, &inner.id)
    }

    /// Record `candidate` as a dependency of this wrapper and propagate its
    /// known dependency set.
    ///
    /// Rules, in order:
    /// 1. Self-edges are a no-op.
    /// 2. An already-recorded edge is a no-op (first writer wins).
    /// 3. The edge is recorded (and as a child edge when `direct_child`).
    /// 4. A candidate unknown to the stack is registered there, then its
    ///    own known dependencies are propagated into this wrapper as
    ///    indirect edges.
    /// 5. A candidate the stack already knows is expanded from the stack's
    ///    record (not the argument), so any concurrently enriched state is
    ///    honored.
    /// 6. The candidate's module requirements, as known via the stack, are
    ///    merged into this wrapper.
    ///
    /// # Errors
    ///
    /// Returns [`MissingDependencyError`] if the candidate's recorded
    /// dependency set cannot be fully resolved from the stack and cache.
    pub fn add_dependency(
        &self,
        candidate: &Self,
        stack: &mut DependencyStack,
        direct_child: bool,
    ) -> Result<(), MissingDependencyError> {
        let candidate_uuid = candidate.uuid();
        if candidate_uuid == self.uuid() {
            return Ok(());
        }

        let candidate_hash = candidate.hash();
        {
            let mut this = self.0.borrow_mut();
            if this.dependencies.contains_key(&candidate_uuid) {
                return Ok(());
            }
            this.dependencies
                .insert(candidate_uuid.clone(), candidate_hash.clone());
            if direct_child {
                this.child_dependencies
                    .insert(candidate_uuid.clone(), candidate_hash);
            }
        }

        if stack.has_dependency(&candidate_uuid) {
            // Expand from the stack's record, not the argument.
            if let Some(known) = stack.get_dependency(&candidate_uuid) {
                let sub_uuids: Vec<EntityUuid> = known.dependencies().into_keys().collect();
                let subs = stack.get_dependencies_by_uuid(&sub_uuids)?;
                self.add_dependencies(stack, subs.values())?;
            }
        } else {
            stack.add_dependency(candidate.clone(), true);
            let sub_uuids: Vec<EntityUuid> = candidate.dependencies().into_keys().collect();
            let subs = stack.get_dependencies_by_uuid(&sub_uuids)?;
            for sub in subs.values() {
                self.add_dependency(sub, stack, false)?;
            }
        }

        let modules = stack
            .get_dependency(&candidate_uuid)
            .map(|known| known.modules());
        if let Some(modules) = modules {
            self.add_module_dependencies(modules);
        }
        Ok(())
    }

    /// Bulk, always-indirect form of [`Self::add_dependency`]: imports an
    /// already-resolved dependency set in one step.
    ///
    /// # Errors
    ///
    /// Returns [`MissingDependencyError`] under the same conditions as
    /// [`Self::add_dependency`].
    pub fn add_dependencies<'a>(
        &self,
        stack: &mut DependencyStack,
        candidates: impl IntoIterator<Item = &'a Self>,
    ) -> Result<(), MissingDependencyError> {
        for candidate in candidates {
            self.add_dependency(candidate, stack, false)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

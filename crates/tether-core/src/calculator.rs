//! The dependency calculator.
//!
//! Computes the full transitive closure of one node: every entity reachable
//! through collector-discovered edges plus the union of module requirements.
//! The walk is single-threaded, synchronous, and recursive; recursion depth
//! is bounded by the number of distinct uuids because a node registers
//! itself provisionally in the stack before running collectors, so any
//! cyclic edge back to it takes the known-record path instead of
//! re-entering collection.
//!
//! Cached closures are trusted only as far as they resolve: if a cached
//! record names a uuid that is absent from both the stack and the cache,
//! the record is considered stale, a warning is logged, and the node is
//! recomputed from live content. This is the designed recovery path for
//! cross-process cache races, which are otherwise last-writer-wins.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::entity::{ContentNode, EntityStorage, EntityUuid, ModuleRegistry};
use crate::error::ErrorCode;
use crate::event::{DependencyCollector, DependencyEvent};
use crate::stack::{DependencyStack, MissingDependencyError};
use crate::wrapper::{DependentWrapper, IdentityError, WrapperHandle};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by dependency calculation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalcError {
    /// A node without a uuid entered the computation.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// A recorded dependency resolved from neither the stack nor the cache.
    /// Fatal only when raised outside the cached-record path; inside it the
    /// calculator recovers by recomputing.
    #[error(transparent)]
    MissingDependency(#[from] MissingDependencyError),

    /// The live node vanished from storage mid-computation.
    #[error("entity ({entity_type_id}, {id}) disappeared during calculation")]
    EntityNotFound {
        /// Entity type of the vanished node.
        entity_type_id: String,
        /// Local id of the vanished node.
        id: String,
    },

    /// A collector failed in a way that invalidates the computation.
    #[error("collector {collector} failed: {message}")]
    Collector {
        /// Name of the failing collector.
        collector: String,
        /// Failure detail.
        message: String,
    },
}

impl CalcError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Identity(e) => e.code(),
            Self::MissingDependency(e) => e.code(),
            Self::EntityNotFound { .. } => ErrorCode::EntityNotFound,
            Self::Collector { .. } => ErrorCode::CollectorFailed,
        }
    }
}

// ---------------------------------------------------------------------------
// DependencyClosure
// ---------------------------------------------------------------------------

/// The result of one calculation: every reachable entity plus the union of
/// module requirements.
#[derive(Debug, Clone, Default)]
pub struct DependencyClosure {
    /// Every entity in the closure, the root included, keyed by uuid.
    pub entities: BTreeMap<EntityUuid, WrapperHandle>,
    /// Union of module requirements across the closure.
    pub modules: BTreeSet<String>,
}

impl DependencyClosure {
    /// Number of entities in the closure.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the closure contains no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

// ---------------------------------------------------------------------------
// DependencyCalculator
// ---------------------------------------------------------------------------

/// Recursive closure calculator over injected collaborators.
pub struct DependencyCalculator {
    storage: Rc<dyn EntityStorage>,
    modules: Rc<dyn ModuleRegistry>,
    collectors: Vec<Box<dyn DependencyCollector>>,
}

impl DependencyCalculator {
    /// Create a calculator with no collectors registered.
    #[must_use]
    pub fn new(storage: Rc<dyn EntityStorage>, modules: Rc<dyn ModuleRegistry>) -> Self {
        Self {
            storage,
            modules,
            collectors: Vec::new(),
        }
    }

    /// Register a collector. Collectors run in registration order but must
    /// not depend on it.
    pub fn add_collector(&mut self, collector: Box<dyn DependencyCollector>) {
        self.collectors.push(collector);
    }

    /// Builder form of [`Self::add_collector`].
    #[must_use]
    pub fn with_collectors(
        mut self,
        collectors: impl IntoIterator<Item = Box<dyn DependencyCollector>>,
    ) -> Self {
        self.collectors.extend(collectors);
        self
    }

    /// The content storage collaborator.
    #[must_use]
    pub fn storage(&self) -> &Rc<dyn EntityStorage> {
        &self.storage
    }

    /// The module registry collaborator.
    #[must_use]
    pub fn modules(&self) -> &Rc<dyn ModuleRegistry> {
        &self.modules
    }

    /// Wrap a live node for calculation.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] if the node has no uuid.
    pub fn wrap(&self, node: &ContentNode) -> Result<WrapperHandle, IdentityError> {
        Ok(WrapperHandle::new(DependentWrapper::new(
            node,
            self.storage.as_ref(),
        )?))
    }

    /// Compute the full closure of `wrapper`, then persist the stack's
    /// permanent entries.
    ///
    /// # Errors
    ///
    /// Returns [`CalcError`] if the computation fails; see
    /// [`Self::calculate_into`].
    pub fn calculate_dependencies(
        &self,
        wrapper: &WrapperHandle,
        stack: &mut DependencyStack,
    ) -> Result<DependencyClosure, CalcError> {
        let mut closure = DependencyClosure::default();
        let result = self.calculate_into(wrapper, stack, &mut closure);
        // Fully resolved entries are valid even when a later node failed.
        stack.persist_permanent();
        result.map(|()| closure)
    }

    /// Recursive body of the calculation, accumulating into `closure`.
    /// Collectors use this form to resolve a discovered target's own
    /// closure mid-pass; cache persistence stays with the top-level call.
    ///
    /// # Errors
    ///
    /// Returns [`CalcError::EntityNotFound`] if the live node vanished,
    /// [`CalcError::MissingDependency`] if a collector-produced edge cannot
    /// be resolved after collection, or any error a collector raises.
    pub fn calculate_into(
        &self,
        wrapper: &WrapperHandle,
        stack: &mut DependencyStack,
        closure: &mut DependencyClosure,
    ) -> Result<(), CalcError> {
        let uuid = wrapper.uuid();
        if closure.entities.contains_key(&uuid) {
            return Ok(());
        }

        // Known-record path: the node was computed earlier in this run,
        // hydrated from the cache, or is provisionally registered behind a
        // cycle. Merge its state instead of re-running collectors.
        if let Some(known) = stack.get_dependency(&uuid) {
            let known_modules = known.modules();
            wrapper.add_module_dependencies(known_modules.iter().cloned());
            closure.modules.extend(known_modules);
            match Self::expand_known(wrapper, stack, &known) {
                Ok(resolved) => {
                    debug!(uuid = %uuid, "resolved from stack record");
                    closure.entities.extend(resolved);
                    closure.entities.insert(uuid, known);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        uuid = %uuid,
                        missing = %e.uuid,
                        "cached dependency set is stale; recomputing from live content"
                    );
                }
            }
        }

        // Provisional registration: cyclic edges back to this node must
        // find a record, even though its dependency data is incomplete.
        stack.add_dependency(wrapper.clone(), false);

        let node = wrapper
            .load_entity(self.storage.as_ref())
            .ok_or_else(|| {
                let inner = wrapper.get();
                CalcError::EntityNotFound {
                    entity_type_id: inner.entity_type_id().to_string(),
                    id: inner.id().to_string(),
                }
            })?;

        let mut event = DependencyEvent::new(wrapper.clone(), node);
        for collector in &self.collectors {
            collector.on_calculate_dependencies(self, stack, &mut event)?;
        }

        // Collection finished: re-register permanent, from here the record
        // is safe to persist.
        stack.add_dependency(wrapper.clone(), true);

        // Every uuid collectors recorded must resolve; a miss here is a
        // hard failure, not staleness.
        let dep_uuids: Vec<EntityUuid> = wrapper.dependencies().into_keys().collect();
        let resolved = stack.get_dependencies_by_uuid(&dep_uuids)?;
        wrapper.add_dependencies(stack, resolved.values())?;
        closure.entities.extend(resolved);
        closure.entities.insert(uuid, wrapper.clone());

        closure.modules.extend(wrapper.modules());
        let entity_type_id = wrapper.get().entity_type_id().to_string();
        if let Some(provider) = self.modules.provider_module(&entity_type_id) {
            if self.modules.is_active(&provider) {
                closure.modules.insert(provider);
            }
        }
        Ok(())
    }

    fn expand_known(
        wrapper: &WrapperHandle,
        stack: &mut DependencyStack,
        known: &WrapperHandle,
    ) -> Result<BTreeMap<EntityUuid, WrapperHandle>, MissingDependencyError> {
        let sub_uuids: Vec<EntityUuid> = known.dependencies().into_keys().collect();
        let subs = stack.get_dependencies_by_uuid(&sub_uuids)?;
        wrapper.add_dependencies(stack, subs.values())?;
        Ok(subs)
    }
}

impl std::fmt::Debug for DependencyCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyCalculator")
            .field("collectors", &self.collectors.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

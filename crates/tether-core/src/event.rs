//! Collector protocol.
//!
//! Edge discovery is pluggable: the calculator raises one
//! [`DependencyEvent`] per node and hands it to every registered
//! [`DependencyCollector`] in registration order. Collectors inspect the
//! loaded node, contribute edges and module requirements through the event,
//! and may recurse through the calculator to resolve a target's own closure
//! first. Collectors must be read-only with respect to content storage and
//! must not rely on each other's ordering.

use std::collections::{BTreeMap, BTreeSet};

use crate::calculator::{CalcError, DependencyCalculator, DependencyClosure};
use crate::entity::{ContentNode, EntityUuid};
use crate::stack::{DependencyStack, MissingDependencyError};
use crate::wrapper::WrapperHandle;

/// A pluggable edge contributor.
///
/// An error from any collector aborts the whole computation; collectors
/// are expected to skip malformed fragments rather than fail on them.
pub trait DependencyCollector {
    /// Contribute edges and module requirements for the event's node.
    ///
    /// # Errors
    ///
    /// Returns [`CalcError`] if discovery fails in a way that invalidates
    /// the whole computation (for example a recursive calculation failing).
    fn on_calculate_dependencies(
        &self,
        calculator: &DependencyCalculator,
        stack: &mut DependencyStack,
        event: &mut DependencyEvent,
    ) -> Result<(), CalcError>;
}

/// Per-node collection context passed to every collector.
///
/// Owns the wrapper being enriched and the live node it was built from,
/// and records what this collection pass contributed.
pub struct DependencyEvent {
    wrapper: WrapperHandle,
    node: ContentNode,
    dependencies: BTreeMap<EntityUuid, WrapperHandle>,
    module_dependencies: BTreeSet<String>,
}

impl DependencyEvent {
    /// Start a collection pass for `wrapper` over its live `node`.
    #[must_use]
    pub fn new(wrapper: WrapperHandle, node: ContentNode) -> Self {
        Self {
            wrapper,
            node,
            dependencies: BTreeMap::new(),
            module_dependencies: BTreeSet::new(),
        }
    }

    /// The wrapper being enriched.
    #[must_use]
    pub const fn wrapper(&self) -> &WrapperHandle {
        &self.wrapper
    }

    /// The live node collectors inspect.
    #[must_use]
    pub const fn node(&self) -> &ContentNode {
        &self.node
    }

    /// Edges contributed so far in this pass.
    #[must_use]
    pub const fn dependencies(&self) -> &BTreeMap<EntityUuid, WrapperHandle> {
        &self.dependencies
    }

    /// Module requirements contributed so far in this pass.
    #[must_use]
    pub const fn module_dependencies(&self) -> &BTreeSet<String> {
        &self.module_dependencies
    }

    /// Record `candidate` as a direct dependency of the event's wrapper.
    ///
    /// # Errors
    ///
    /// Returns [`MissingDependencyError`] if the candidate's recorded
    /// dependency set cannot be resolved (see
    /// [`WrapperHandle::add_dependency`]).
    pub fn add_dependency(
        &mut self,
        candidate: &WrapperHandle,
        stack: &mut DependencyStack,
    ) -> Result<(), MissingDependencyError> {
        self.wrapper.add_dependency(candidate, stack, true)?;
        self.dependencies.insert(candidate.uuid(), candidate.clone());
        Ok(())
    }

    /// Record a module requirement on the event's wrapper.
    pub fn add_module_dependency(&mut self, module: impl Into<String>) {
        let module = module.into();
        self.wrapper
            .add_module_dependencies([module.clone()]);
        self.module_dependencies.insert(module);
    }
}

/// Import a recursively computed closure into `wrapper`.
///
/// The closure's entities arrive as indirect edges (the direct edge to the
/// closure's root, if any, is the caller's to add) and its module bucket is
/// merged wholesale. Shared helper for collectors that resolve a target's
/// full closure before linking it.
///
/// # Errors
///
/// Returns [`MissingDependencyError`] under the same conditions as
/// [`WrapperHandle::add_dependency`].
pub fn merge_dependencies(
    wrapper: &WrapperHandle,
    stack: &mut DependencyStack,
    closure: &DependencyClosure,
) -> Result<(), MissingDependencyError> {
    wrapper.add_dependencies(stack, closure.entities.values())?;
    wrapper.add_module_dependencies(closure.modules.iter().cloned());
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

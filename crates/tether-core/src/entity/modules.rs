//! The module-providership collaborator.
//!
//! Every entity type is provided by a packaging module; a node's existence
//! requires its provider module wherever the node is re-created. The
//! registry answers which module provides a type and whether a module is
//! active in the current site.

use std::collections::{BTreeMap, BTreeSet};

/// Module-providership lookups, injected into the calculator and collectors.
pub trait ModuleRegistry {
    /// The module providing `entity_type_id`, if any is registered.
    fn provider_module(&self, entity_type_id: &str) -> Option<String>;

    /// Whether `module` is active in this installation.
    fn is_active(&self, module: &str) -> bool;
}

/// Fixed provider map plus active set, typically built from project config.
#[derive(Debug, Clone, Default)]
pub struct StaticModuleRegistry {
    providers: BTreeMap<String, String>,
    active: BTreeSet<String>,
}

impl StaticModuleRegistry {
    /// Build a registry from a provider map and the active module set.
    #[must_use]
    pub fn new(providers: BTreeMap<String, String>, active: BTreeSet<String>) -> Self {
        Self { providers, active }
    }

    /// Register `module` as the provider of `entity_type_id` and mark it
    /// active. Convenience for fixtures and tests.
    pub fn register(&mut self, entity_type_id: impl Into<String>, module: impl Into<String>) {
        let module = module.into();
        self.providers.insert(entity_type_id.into(), module.clone());
        self.active.insert(module);
    }

    /// Mark a module active without registering it as a provider.
    pub fn activate(&mut self, module: impl Into<String>) {
        self.active.insert(module.into());
    }
}

impl ModuleRegistry for StaticModuleRegistry {
    fn provider_module(&self, entity_type_id: &str) -> Option<String> {
        self.providers.get(entity_type_id).cloned()
    }

    fn is_active(&self, module: &str) -> bool {
        self.active.contains(module)
    }
}

//! Provider-module edges.

use std::rc::Rc;

use tether_core::{
    CalcError, DependencyCalculator, DependencyCollector, DependencyEvent, DependencyStack,
    ModuleRegistry,
};

/// Adds the provider module of the node's own entity type as a module
/// dependency, provided that module is active.
///
/// This is the collector that makes module requirements travel: once the
/// provider lands on a wrapper, wrapper merging carries it to everything
/// that depends on the node.
pub struct ProviderModuleCollector {
    modules: Rc<dyn ModuleRegistry>,
}

impl ProviderModuleCollector {
    #[must_use]
    pub fn new(modules: Rc<dyn ModuleRegistry>) -> Self {
        Self { modules }
    }
}

impl DependencyCollector for ProviderModuleCollector {
    fn on_calculate_dependencies(
        &self,
        _calculator: &DependencyCalculator,
        _stack: &mut DependencyStack,
        event: &mut DependencyEvent,
    ) -> Result<(), CalcError> {
        if let Some(provider) = self.modules.provider_module(&event.node().entity_type_id) {
            if self.modules.is_active(&provider) {
                event.add_module_dependency(provider);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntityReferenceCollector;
    use crate::testutil::{leaf, registry, run, variant_node};
    use tether_core::{EntityUuid, FieldValue, MemoryStorage};

    #[test]
    fn provider_modules_propagate_through_references() {
        let mut storage = MemoryStorage::new();
        storage.insert(variant_node(
            "node",
            "1",
            "u1",
            vec![(
                "tags",
                FieldValue::Reference {
                    target_type: "taxonomy_term".into(),
                    targets: vec!["7".into()],
                },
            )],
        ));
        storage.insert(leaf("taxonomy_term", "7", "t7"));

        let storage = Rc::new(storage);
        let collectors: Vec<Box<dyn DependencyCollector>> = vec![
            Box::new(EntityReferenceCollector::new(storage.clone())),
            Box::new(ProviderModuleCollector::new(Rc::new(registry()))),
        ];
        let closure = run(storage.clone(), collectors, "node", "1");

        assert!(closure.modules.contains("node"));
        assert!(closure.modules.contains("taxonomy"));
        // The collector lands the provider on the wrapper itself, so the
        // requirement survives snapshotting and merging.
        let term = closure
            .entities
            .get(&EntityUuid::new_unchecked("t7"))
            .expect("term");
        assert!(term.modules().contains("taxonomy"));
        let root = closure
            .entities
            .get(&EntityUuid::new_unchecked("u1"))
            .expect("root");
        assert!(root.modules().contains("taxonomy"));
    }

    #[test]
    fn inactive_providers_are_ignored() {
        let mut storage = MemoryStorage::new();
        storage.insert(leaf("media", "1", "m1"));
        let storage = Rc::new(storage);

        // "media" has a provider mapping nowhere in the registry fixture.
        let collectors: Vec<Box<dyn DependencyCollector>> =
            vec![Box::new(ProviderModuleCollector::new(Rc::new(registry())))];
        let closure = run(storage, collectors, "media", "1");
        assert!(closure.modules.is_empty());
    }
}

//! Link-field edges.

use std::rc::Rc;

use tether_core::{
    CalcError, DependencyCalculator, DependencyCollector, DependencyEvent, DependencyStack,
    EntityStorage, FieldValue, ModuleRegistry,
};
use tracing::trace;

use crate::attach_target;

/// What a link URI points at, as far as dependency tracking cares.
#[derive(Debug, PartialEq, Eq)]
enum LinkTarget {
    Entity { entity_type: String, id: String },
    Route { module: String },
}

/// Walks link fields and turns resolvable URIs into edges:
///
/// - `entity:<type>/<id>` and `internal:/<type>/<id>` resolve to entity
///   dependencies, recursively calculated.
/// - `route:<module>.<name>` adds a module dependency when the module is
///   active.
/// - External URIs and unresolvable internals are skipped.
pub struct LinkFieldCollector {
    storage: Rc<dyn EntityStorage>,
    modules: Rc<dyn ModuleRegistry>,
}

impl LinkFieldCollector {
    #[must_use]
    pub fn new(storage: Rc<dyn EntityStorage>, modules: Rc<dyn ModuleRegistry>) -> Self {
        Self { storage, modules }
    }
}

fn parse_uri(uri: &str) -> Option<LinkTarget> {
    if let Some(rest) = uri.strip_prefix("entity:") {
        let (entity_type, id) = rest.split_once('/')?;
        if entity_type.is_empty() || id.is_empty() {
            return None;
        }
        return Some(LinkTarget::Entity {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        });
    }
    if let Some(rest) = uri.strip_prefix("internal:/") {
        let (entity_type, id) = rest.split_once('/')?;
        if entity_type.is_empty() || id.is_empty() || id.contains('/') {
            return None;
        }
        return Some(LinkTarget::Entity {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        });
    }
    if let Some(rest) = uri.strip_prefix("route:") {
        let (module, name) = rest.split_once('.')?;
        if module.is_empty() || name.is_empty() {
            return None;
        }
        return Some(LinkTarget::Route {
            module: module.to_string(),
        });
    }
    None
}

impl DependencyCollector for LinkFieldCollector {
    fn on_calculate_dependencies(
        &self,
        calculator: &DependencyCalculator,
        stack: &mut DependencyStack,
        event: &mut DependencyEvent,
    ) -> Result<(), CalcError> {
        let mut uris: Vec<String> = Vec::new();
        for (_, _, value) in event.node().variant_fields() {
            if let FieldValue::Link { links } = value {
                uris.extend(links.iter().map(|link| link.uri.clone()));
            }
        }

        for uri in uris {
            match parse_uri(&uri) {
                Some(LinkTarget::Entity { entity_type, id }) => {
                    let Some(target) = self.storage.load(&entity_type, &id) else {
                        trace!(uri = %uri, "skipping link to a nonexistent entity");
                        continue;
                    };
                    attach_target(calculator, stack, event, &target)?;
                }
                Some(LinkTarget::Route { module }) => {
                    if self.modules.is_active(&module) {
                        event.add_module_dependency(module);
                    }
                }
                None => {
                    trace!(uri = %uri, "skipping external or malformed link");
                }
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
    use crate::testutil::{leaf, registry, run, variant_node};
    use tether_core::entity::LinkValue;
    use tether_core::{EntityUuid, MemoryStorage};

    fn link(uri: &str) -> LinkValue {
        LinkValue {
            uri: uri.to_string(),
            title: None,
        }
    }

    fn node_with_links(uris: &[&str]) -> tether_core::ContentNode {
        variant_node(
            "node",
            "1",
            "u1",
            vec![(
                "related",
                FieldValue::Link {
                    links: uris.iter().map(|uri| link(uri)).collect(),
                },
            )],
        )
    }

    fn collectors(storage: &Rc<MemoryStorage>) -> Vec<Box<dyn DependencyCollector>> {
        vec![Box::new(LinkFieldCollector::new(
            storage.clone(),
            Rc::new(registry()),
        ))]
    }

    #[test]
    fn parses_the_three_tracked_uri_forms() {
        assert_eq!(
            parse_uri("entity:node/2"),
            Some(LinkTarget::Entity {
                entity_type: "node".into(),
                id: "2".into()
            })
        );
        assert_eq!(
            parse_uri("internal:/taxonomy_term/7"),
            Some(LinkTarget::Entity {
                entity_type: "taxonomy_term".into(),
                id: "7".into()
            })
        );
        assert_eq!(
            parse_uri("route:contact.site_page"),
            Some(LinkTarget::Route {
                module: "contact".into()
            })
        );

        assert_eq!(parse_uri("https://example.com"), None);
        assert_eq!(parse_uri("mailto:a@example.com"), None);
        assert_eq!(parse_uri("entity:node"), None, "no id segment");
        assert_eq!(parse_uri("internal:/about/team/history"), None);
        assert_eq!(parse_uri("route:frontpage"), None, "no route name");
    }

    #[test]
    fn entity_and_internal_links_become_edges() {
        let mut storage = MemoryStorage::new();
        storage.insert(node_with_links(&[
            "entity:node/2",
            "internal:/taxonomy_term/7",
            "https://example.com",
        ]));
        storage.insert(leaf("node", "2", "u2"));
        storage.insert(leaf("taxonomy_term", "7", "t7"));

        let storage = Rc::new(storage);
        let closure = run(storage.clone(), collectors(&storage), "node", "1");

        assert_eq!(closure.len(), 3, "external link contributed nothing");
        let root = closure
            .entities
            .get(&EntityUuid::new_unchecked("u1"))
            .expect("root");
        assert!(root.get().child_dependencies().contains_key(&EntityUuid::new_unchecked("u2")));
        assert!(root.get().child_dependencies().contains_key(&EntityUuid::new_unchecked("t7")));
    }

    #[test]
    fn route_links_add_active_modules_only() {
        let mut storage = MemoryStorage::new();
        storage.insert(node_with_links(&[
            "route:taxonomy.overview",
            "route:webform.submissions",
        ]));
        let storage = Rc::new(storage);

        // "taxonomy" is active in the fixture registry, "webform" is not.
        let closure = run(storage.clone(), collectors(&storage), "node", "1");
        assert!(closure.modules.contains("taxonomy"));
        assert!(!closure.modules.contains("webform"));
    }

    #[test]
    fn unresolvable_internal_links_are_skipped() {
        let mut storage = MemoryStorage::new();
        storage.insert(node_with_links(&["entity:node/404"]));
        let storage = Rc::new(storage);
        let closure = run(storage.clone(), collectors(&storage), "node", "1");
        assert_eq!(closure.len(), 1);
    }
}

//! Path-alias edges.

use std::rc::Rc;

use tether_core::{
    CalcError, DependencyCalculator, DependencyCollector, DependencyEvent, DependencyStack,
    EntityStorage, FieldValue,
};
use tracing::trace;

use crate::attach_target;

/// For `path_alias` entities, parses the aliased canonical `/type/id` path
/// and adds the target entity as a direct dependency. An alias is useless
/// without the entity it points at.
pub struct PathAliasCollector {
    storage: Rc<dyn EntityStorage>,
}

impl PathAliasCollector {
    #[must_use]
    pub fn new(storage: Rc<dyn EntityStorage>) -> Self {
        Self { storage }
    }
}

/// Parse a canonical path of the form `/<entity_type>/<id>`.
fn parse_canonical_path(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix('/')?;
    let (entity_type, id) = rest.split_once('/')?;
    if entity_type.is_empty() || id.is_empty() || id.contains('/') {
        return None;
    }
    Some((entity_type, id))
}

impl DependencyCollector for PathAliasCollector {
    fn on_calculate_dependencies(
        &self,
        calculator: &DependencyCalculator,
        stack: &mut DependencyStack,
        event: &mut DependencyEvent,
    ) -> Result<(), CalcError> {
        if event.node().entity_type_id != "path_alias" {
            return Ok(());
        }

        let mut targets: Vec<(String, String)> = Vec::new();
        for (_, name, value) in event.node().variant_fields() {
            if name != "path" {
                continue;
            }
            let FieldValue::Scalar { value } = value else {
                continue;
            };
            let Some(path) = value.as_str() else { continue };
            match parse_canonical_path(path) {
                Some((entity_type, id)) => {
                    targets.push((entity_type.to_string(), id.to_string()));
                }
                None => trace!(path = %path, "skipping alias with a non-canonical path"),
            }
        }

        for (entity_type, id) in targets {
            let Some(target) = self.storage.load(&entity_type, &id) else {
                trace!(
                    entity_type = %entity_type,
                    id = %id,
                    "skipping alias to a nonexistent entity"
                );
                continue;
            };
            attach_target(calculator, stack, event, &target)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

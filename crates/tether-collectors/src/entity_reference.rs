//! Reference-field edges.

use std::rc::Rc;

use tether_core::{
    CalcError, DependencyCalculator, DependencyCollector, DependencyEvent, DependencyStack,
    EntityStorage, FieldValue,
};
use tracing::trace;

use crate::attach_target;

/// Walks reference and versioned-reference fields over every language
/// variant and adds each resolvable target as a direct dependency.
///
/// Dangling targets are skipped, mirroring hash normalization: a reference
/// that resolves to nothing contributes neither content nor an edge.
pub struct EntityReferenceCollector {
    storage: Rc<dyn EntityStorage>,
}

impl EntityReferenceCollector {
    #[must_use]
    pub fn new(storage: Rc<dyn EntityStorage>) -> Self {
        Self { storage }
    }
}

impl DependencyCollector for EntityReferenceCollector {
    fn on_calculate_dependencies(
        &self,
        calculator: &DependencyCalculator,
        stack: &mut DependencyStack,
        event: &mut DependencyEvent,
    ) -> Result<(), CalcError> {
        let mut targets: Vec<(String, String)> = Vec::new();
        for (_, _, value) in event.node().variant_fields() {
            match value {
                FieldValue::Reference {
                    target_type,
                    targets: ids,
                } => {
                    for id in ids {
                        targets.push((target_type.clone(), id.clone()));
                    }
                }
                FieldValue::VersionedReference {
                    target_type,
                    targets: refs,
                } => {
                    for target in refs {
                        targets.push((target_type.clone(), target.id.clone()));
                    }
                }
                _ => {}
            }
        }

        for (target_type, id) in targets {
            let Some(target) = self.storage.load(&target_type, &id) else {
                trace!(
                    entity_type = %target_type,
                    id = %id,
                    "skipping dangling reference target"
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

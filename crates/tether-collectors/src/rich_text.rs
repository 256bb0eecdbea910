//! Rich-text embed edges.

use std::rc::Rc;
use std::sync::OnceLock;

use regex::Regex;
use tether_core::{
    CalcError, DependencyCalculator, DependencyCollector, DependencyEvent, DependencyStack,
    EntityStorage, EntityUuid, FieldValue,
};
use tracing::trace;

use crate::attach_target;

static EMBED_PATTERNS: OnceLock<EmbedPatternSet> = OnceLock::new();

/// Pre-compiled embed patterns, compiled once per process.
#[derive(Debug)]
struct EmbedPatternSet {
    tag: Regex,
    entity_type: Regex,
    entity_uuid: Regex,
}

impl EmbedPatternSet {
    fn new() -> Self {
        Self {
            tag: Regex::new(r"<entity-embed\b[^>]*>").expect("tag regex must compile"),
            entity_type: Regex::new(r#"data-entity-type\s*=\s*"([^"]+)""#)
                .expect("entity_type regex must compile"),
            entity_uuid: Regex::new(r#"data-entity-uuid\s*=\s*"([^"]+)""#)
                .expect("entity_uuid regex must compile"),
        }
    }
}

fn patterns() -> &'static EmbedPatternSet {
    EMBED_PATTERNS.get_or_init(EmbedPatternSet::new)
}

/// Scans rich-text bodies for `<entity-embed … >` tags and adds each
/// resolvable embedded entity as a direct dependency. Nested embeds resolve
/// in the same pass because targets are recursively calculated before being
/// linked. Tags missing either attribute, and uuids that resolve to
/// nothing, are skipped.
pub struct RichTextEmbedCollector {
    storage: Rc<dyn EntityStorage>,
}

impl RichTextEmbedCollector {
    #[must_use]
    pub fn new(storage: Rc<dyn EntityStorage>) -> Self {
        Self { storage }
    }
}

/// Extract `(entity_type, uuid)` pairs from one markup body.
fn scan_embeds(body: &str) -> Vec<(String, String)> {
    let patterns = patterns();
    patterns
        .tag
        .find_iter(body)
        .filter_map(|tag| {
            let tag = tag.as_str();
            let entity_type = patterns.entity_type.captures(tag)?.get(1)?.as_str();
            let uuid = patterns.entity_uuid.captures(tag)?.get(1)?.as_str();
            Some((entity_type.to_string(), uuid.to_string()))
        })
        .collect()
}

impl DependencyCollector for RichTextEmbedCollector {
    fn on_calculate_dependencies(
        &self,
        calculator: &DependencyCalculator,
        stack: &mut DependencyStack,
        event: &mut DependencyEvent,
    ) -> Result<(), CalcError> {
        let mut embeds: Vec<(String, String)> = Vec::new();
        for (_, _, value) in event.node().variant_fields() {
            if let FieldValue::RichText { body } = value {
                embeds.extend(scan_embeds(body));
            }
        }

        for (entity_type, uuid) in embeds {
            let uuid = EntityUuid::new_unchecked(&uuid);
            let Some(target) = self.storage.load_by_uuid(&entity_type, &uuid) else {
                trace!(
                    entity_type = %entity_type,
                    uuid = %uuid,
                    "skipping embed of a nonexistent entity"
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

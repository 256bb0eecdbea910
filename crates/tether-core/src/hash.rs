//! Content fingerprinting.
//!
//! Two nodes with logically identical content at the same point in time must
//! produce the same hash, so the hash input is a canonical JSON rendering of
//! the node's values (all maps are `BTreeMap`, so key order is fixed) fed to
//! BLAKE3. Hash format: `blake3:<lowercase hex>`.
//!
//! # Normalization
//!
//! Reference fields frequently carry transient metadata that does not
//! reflect true content state, so before hashing every reference and
//! versioned-reference target is resolved against live storage and dropped
//! if its target no longer exists. A node whose reference silently dangles
//! hashes identically to one where that reference was never set, keeping
//! stale references from causing spurious change detection. All other field
//! values pass through unmodified.
//!
//! Known edge case, preserved on purpose: an entity whose entire meaningful
//! state is a single dangling reference hashes like an empty one, masking
//! that drift. Downstream cache semantics depend on this behavior.

use std::collections::BTreeMap;

use crate::entity::{ContentNode, EntityStorage, FieldMap, FieldValue, NodeValues};

/// Prefix on every content hash string.
pub const HASH_PREFIX: &str = "blake3:";

/// Compute the content fingerprint of a node.
///
/// Nodes with language variants hash the canonical serialization of
/// `{language → normalized field map}` over every existing variant; raw
/// nodes hash their full value snapshot directly, without normalization.
#[must_use]
pub fn content_hash(node: &ContentNode, storage: &dyn EntityStorage) -> String {
    let canonical = match &node.values {
        NodeValues::Raw(value) => {
            serde_json::to_vec(value).unwrap_or_else(|_| value.to_string().into_bytes())
        }
        NodeValues::Variants(variants) => {
            let normalized: BTreeMap<&str, FieldMap> = variants
                .iter()
                .map(|(lang, fields)| (lang.as_str(), normalized_fields(fields, storage)))
                .collect();
            serde_json::to_vec(&normalized).unwrap_or_default()
        }
    };
    format!("{HASH_PREFIX}{}", blake3::hash(&canonical).to_hex())
}

/// Normalize one variant's field map for hashing.
///
/// Drops every reference target that no longer resolves against `storage`;
/// everything else is returned as-is.
#[must_use]
pub fn normalized_fields(fields: &FieldMap, storage: &dyn EntityStorage) -> FieldMap {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), normalized_value(value, storage)))
        .collect()
}

fn normalized_value(value: &FieldValue, storage: &dyn EntityStorage) -> FieldValue {
    match value {
        FieldValue::Reference {
            target_type,
            targets,
        } => FieldValue::Reference {
            target_type: target_type.clone(),
            targets: targets
                .iter()
                .filter(|id| storage.load(target_type, id).is_some())
                .cloned()
                .collect(),
        },
        FieldValue::VersionedReference {
            target_type,
            targets,
        } => FieldValue::VersionedReference {
            target_type: target_type.clone(),
            targets: targets
                .iter()
                .filter(|target| storage.load(target_type, &target.id).is_some())
                .cloned()
                .collect(),
        },
        other => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityUuid, MemoryStorage};
    use serde_json::json;

    fn term(id: &str, uuid: &str, name: &str) -> ContentNode {
        let mut fields = FieldMap::new();
        fields.insert(
            "name".into(),
            FieldValue::Scalar {
                value: json!(name),
            },
        );
        let mut variants = BTreeMap::new();
        variants.insert("en".to_string(), fields);
        ContentNode::with_variants(
            "taxonomy_term",
            id,
            Some(EntityUuid::new_unchecked(uuid)),
            variants,
        )
    }

    fn article(targets: Vec<String>) -> ContentNode {
        let mut fields = FieldMap::new();
        fields.insert(
            "title".into(),
            FieldValue::Scalar {
                value: json!("My node"),
            },
        );
        fields.insert(
            "tags".into(),
            FieldValue::Reference {
                target_type: "taxonomy_term".into(),
                targets,
            },
        );
        let mut variants = BTreeMap::new();
        variants.insert("en".to_string(), fields);
        ContentNode::with_variants("node", "1", Some(EntityUuid::new_unchecked("u1")), variants)
    }

    #[test]
    fn hash_is_prefixed_hex() {
        let storage = MemoryStorage::new();
        let hash = content_hash(&term("7", "t7", "Tag"), &storage);
        let hex = hash.strip_prefix(HASH_PREFIX).expect("blake3 prefix");
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_is_deterministic() {
        let storage = MemoryStorage::new();
        let node = article(vec![]);
        assert_eq!(content_hash(&node, &storage), content_hash(&node, &storage));
    }

    #[test]
    fn hash_stable_under_reference_repointing() {
        // Point the field at one resolvable target, then another, then back;
        // content equality implies hash equality.
        let mut storage = MemoryStorage::new();
        storage.insert(term("7", "t7", "Tag"));
        storage.insert(term("8", "t8", "Other tag"));

        let original = article(vec!["7".into()]);
        let repointed = article(vec!["8".into()]);
        let restored = article(vec!["7".into()]);

        let h1 = content_hash(&original, &storage);
        let h2 = content_hash(&repointed, &storage);
        let h3 = content_hash(&restored, &storage);

        assert_ne!(h1, h2, "different resolvable target changes the hash");
        assert_eq!(h1, h3, "restored state matches the original hash");
    }

    #[test]
    fn hash_insensitive_to_referenced_content_change() {
        // The referenced term's own content is not part of this node's hash.
        let mut storage = MemoryStorage::new();
        storage.insert(term("7", "t7", "Tag"));
        let node = article(vec!["7".into()]);
        let before = content_hash(&node, &storage);

        storage.insert(term("7", "t7", "Tag renamed"));
        assert_eq!(before, content_hash(&node, &storage));
    }

    #[test]
    fn hash_sensitive_to_scalar_change() {
        let storage = MemoryStorage::new();
        let mut node = article(vec![]);
        let before = content_hash(&node, &storage);

        if let NodeValues::Variants(variants) = &mut node.values {
            variants
                .get_mut("en")
                .expect("en variant")
                .insert(
                    "title".into(),
                    FieldValue::Scalar {
                        value: json!("My node updated"),
                    },
                );
        }
        assert_ne!(before, content_hash(&node, &storage));
    }

    #[test]
    fn hash_sensitive_to_variant_add_and_remove() {
        let storage = MemoryStorage::new();
        let mut node = article(vec![]);
        let monolingual = content_hash(&node, &storage);

        if let NodeValues::Variants(variants) = &mut node.values {
            let mut fields = FieldMap::new();
            fields.insert(
                "title".into(),
                FieldValue::Scalar {
                    value: json!("Mon nœud"),
                },
            );
            variants.insert("fr".to_string(), fields);
        }
        let bilingual = content_hash(&node, &storage);
        assert_ne!(monolingual, bilingual);

        if let NodeValues::Variants(variants) = &mut node.values {
            variants.remove("fr");
        }
        assert_eq!(monolingual, content_hash(&node, &storage));
    }

    #[test]
    fn hash_sensitive_to_clearing_a_resolvable_reference() {
        let mut storage = MemoryStorage::new();
        storage.insert(term("7", "t7", "Tag"));

        let set = article(vec!["7".into()]);
        let cleared = article(vec![]);
        assert_ne!(
            content_hash(&set, &storage),
            content_hash(&cleared, &storage),
            "clearing a live reference is a real content change"
        );
    }

    #[test]
    fn dangling_reference_hashes_like_empty() {
        let mut storage = MemoryStorage::new();
        storage.insert(term("7", "t7", "Tag"));

        let node = article(vec!["7".into()]);
        let with_live_target = content_hash(&node, &storage);

        storage.remove("taxonomy_term", "7");
        let with_dangling = content_hash(&node, &storage);
        let with_empty = content_hash(&article(vec![]), &storage);

        assert_ne!(with_live_target, with_dangling);
        assert_eq!(with_dangling, with_empty);
    }

    #[test]
    fn versioned_reference_drops_dangling_targets() {
        use crate::entity::ReferenceTarget;

        let mut storage = MemoryStorage::new();
        storage.insert(term("9", "t9", "Para"));

        let mut fields = FieldMap::new();
        fields.insert(
            "paragraphs".into(),
            FieldValue::VersionedReference {
                target_type: "taxonomy_term".into(),
                targets: vec![
                    ReferenceTarget {
                        id: "9".into(),
                        revision: Some("3".into()),
                    },
                    ReferenceTarget {
                        id: "404".into(),
                        revision: None,
                    },
                ],
            },
        );
        let normalized = normalized_fields(&fields, &storage);
        match normalized.get("paragraphs").expect("field kept") {
            FieldValue::VersionedReference { targets, .. } => {
                assert_eq!(targets.len(), 1);
                assert_eq!(targets[0].id, "9");
            }
            other => panic!("unexpected normalized value: {other:?}"),
        }
    }

    #[test]
    fn raw_nodes_hash_without_normalization() {
        // Raw snapshots carry no reference semantics; the payload is hashed
        // verbatim even when it mentions ids that do not resolve.
        let storage = MemoryStorage::new();
        let node = ContentNode::raw(
            "node_type",
            "article",
            Some(EntityUuid::new_unchecked("u-type")),
            json!({"name": "Article", "default_term": "404"}),
        );
        let h1 = content_hash(&node, &storage);
        let h2 = content_hash(&node, &storage);
        assert_eq!(h1, h2);
    }
}

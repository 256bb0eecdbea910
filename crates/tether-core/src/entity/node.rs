//! Content nodes: the live-content snapshot handed to hashing, wrapper
//! construction, and collectors.
//!
//! A node carries its identity (`entity_type_id`, local `id`, portable
//! `uuid`) and its values, either as language-keyed field maps (content
//! entities) or as a raw value snapshot (config-style entities without
//! language variants). All maps are `BTreeMap` so that serialization is
//! canonical, which the content hash depends on.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// EntityUuid
// ---------------------------------------------------------------------------

/// Portable, globally unique entity identity — the graph key.
///
/// Any non-empty string is accepted; the storage engine decides the actual
/// format (RFC 4122 uuids in practice). Local ids are storage-specific and
/// never cross system boundaries; this type is what does.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityUuid(String);

impl EntityUuid {
    /// Wrap a raw identifier, returning `None` for an empty string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.is_empty() { None } else { Some(Self(raw)) }
    }

    /// Wrap a raw identifier without the emptiness check.
    ///
    /// For literals in tests and fixtures known to be well-formed.
    #[must_use]
    pub fn new_unchecked(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// A reference pinned to a specific revision of its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceTarget {
    /// Local id of the referenced entity.
    pub id: String,
    /// Revision identifier, if the reference is revision-pinned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

/// One item of a link field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkValue {
    /// Link target: `entity:<type>/<id>`, `internal:/<path>`,
    /// `route:<module>.<name>`, or an external URL.
    pub uri: String,
    /// Optional human-facing link title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// The value of one field on one language variant.
///
/// Only reference-like kinds participate in hash normalization; everything
/// else passes through the hash verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldValue {
    /// Arbitrary JSON payload (text, numbers, structured settings).
    Scalar {
        /// The raw field value.
        value: serde_json::Value,
    },
    /// References to other entities by local id.
    Reference {
        /// Entity type of every target.
        target_type: String,
        /// Local ids of the referenced entities.
        targets: Vec<String>,
    },
    /// References pinned to specific target revisions.
    VersionedReference {
        /// Entity type of every target.
        target_type: String,
        /// Referenced entities with optional revision pins.
        targets: Vec<ReferenceTarget>,
    },
    /// Link items pointing at entities, routes, or external URLs.
    Link {
        /// The link items.
        links: Vec<LinkValue>,
    },
    /// Markup that may embed other entities via `<entity-embed>` tags.
    RichText {
        /// The markup body.
        body: String,
    },
}

/// Field name → value map for one language variant.
pub type FieldMap = BTreeMap<String, FieldValue>;

// ---------------------------------------------------------------------------
// ContentNode
// ---------------------------------------------------------------------------

/// The values carried by a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeValues {
    /// Config-style snapshot without language variants; hashed verbatim.
    Raw(serde_json::Value),
    /// Language-keyed field maps; normalized before hashing.
    Variants(BTreeMap<String, FieldMap>),
}

/// One unit of content with a portable unique identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentNode {
    /// Category discriminator of the node.
    pub entity_type_id: String,
    /// Local identifier, storage-engine specific.
    pub id: String,
    /// Portable identity; absence is fatal at wrapper construction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<EntityUuid>,
    /// The node's values.
    pub values: NodeValues,
}

impl ContentNode {
    /// Build a node with language variants.
    #[must_use]
    pub fn with_variants(
        entity_type_id: impl Into<String>,
        id: impl Into<String>,
        uuid: Option<EntityUuid>,
        variants: BTreeMap<String, FieldMap>,
    ) -> Self {
        Self {
            entity_type_id: entity_type_id.into(),
            id: id.into(),
            uuid,
            values: NodeValues::Variants(variants),
        }
    }

    /// Build a config-style node from a raw value snapshot.
    #[must_use]
    pub fn raw(
        entity_type_id: impl Into<String>,
        id: impl Into<String>,
        uuid: Option<EntityUuid>,
        value: serde_json::Value,
    ) -> Self {
        Self {
            entity_type_id: entity_type_id.into(),
            id: id.into(),
            uuid,
            values: NodeValues::Raw(value),
        }
    }

    /// Iterate every `(language, field name, value)` triple across all
    /// variants. Raw nodes yield nothing.
    pub fn variant_fields(&self) -> impl Iterator<Item = (&str, &str, &FieldValue)> {
        let variants = match &self.values {
            NodeValues::Variants(map) => Some(map),
            NodeValues::Raw(_) => None,
        };
        variants.into_iter().flat_map(|map| {
            map.iter().flat_map(|(lang, fields)| {
                fields
                    .iter()
                    .map(move |(name, value)| (lang.as_str(), name.as_str(), value))
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

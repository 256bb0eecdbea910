//! The content storage collaborator.
//!
//! Real deployments implement [`EntityStorage`] over their content backend;
//! [`MemoryStorage`] serves fixtures and tests. Storage must return a
//! consistent snapshot for the duration of one hash computation; tether
//! never writes through this trait.

use std::collections::HashMap;

use crate::entity::node::{ContentNode, EntityUuid};

/// Read-only access to live content nodes.
pub trait EntityStorage {
    /// Load a node by entity type and local id. `None` means the node does
    /// not exist (deleted targets normalize away on this answer).
    fn load(&self, entity_type_id: &str, id: &str) -> Option<ContentNode>;

    /// Load a node by entity type and portable identifier.
    fn load_by_uuid(&self, entity_type_id: &str, uuid: &EntityUuid) -> Option<ContentNode>;
}

/// Map-backed storage for fixtures and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    nodes: HashMap<(String, String), ContentNode>,
}

impl MemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node, keyed by `(entity_type_id, id)`.
    pub fn insert(&mut self, node: ContentNode) {
        self.nodes
            .insert((node.entity_type_id.clone(), node.id.clone()), node);
    }

    /// Remove a node, returning it if present. Used by tests to simulate
    /// deletion between hash computations.
    pub fn remove(&mut self, entity_type_id: &str, id: &str) -> Option<ContentNode> {
        self.nodes
            .remove(&(entity_type_id.to_string(), id.to_string()))
    }

    /// Number of stored nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl EntityStorage for MemoryStorage {
    fn load(&self, entity_type_id: &str, id: &str) -> Option<ContentNode> {
        self.nodes
            .get(&(entity_type_id.to_string(), id.to_string()))
            .cloned()
    }

    fn load_by_uuid(&self, entity_type_id: &str, uuid: &EntityUuid) -> Option<ContentNode> {
        self.nodes
            .values()
            .find(|node| {
                node.entity_type_id == entity_type_id && node.uuid.as_ref() == Some(uuid)
            })
            .cloned()
    }
}

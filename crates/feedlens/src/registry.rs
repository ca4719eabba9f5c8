//! Identity registry: the source of truth for "what exists".
//!
//! The registry is independent of current render state. An entry that the
//! host virtualizes away is still known; ids are never removed within a
//! session, so the registry only grows or updates in place.

use crate::surface::{EntryId, NodeId};
use std::collections::HashMap;

/// Everything remembered about one logical entry.
#[derive(Debug, Clone)]
pub struct EntryRecord {
    pub id: EntryId,
    /// Text captured at the most recent sighting. May be stale.
    pub last_known_text: String,
    /// Node seen at the most recent sighting. The node may have left the
    /// tree since; treat as a hint only.
    pub last_seen_node: Option<NodeId>,
}

/// Set of logical ids ever discovered, in first-discovery order.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    records: HashMap<EntryId, EntryRecord>,
    order: Vec<EntryId>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sighting. First sighting creates the record; later
    /// sightings overwrite the text and node reference in place.
    ///
    /// Returns `true` when the id was newly discovered.
    pub fn upsert(&mut self, id: EntryId, text: String, node: Option<NodeId>) -> bool {
        match self.records.get_mut(&id) {
            Some(record) => {
                record.last_known_text = text;
                record.last_seen_node = node;
                false
            }
            None => {
                self.order.push(id.clone());
                self.records.insert(
                    id.clone(),
                    EntryRecord {
                        id,
                        last_known_text: text,
                        last_seen_node: node,
                    },
                );
                true
            }
        }
    }

    pub fn contains(&self, id: &EntryId) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &EntryId) -> Option<&EntryRecord> {
        self.records.get(id)
    }

    pub fn text_of(&self, id: &EntryId) -> Option<&str> {
        self.records.get(id).map(|r| r.last_known_text.as_str())
    }

    /// All known ids in first-discovery order.
    pub fn ids(&self) -> impl Iterator<Item = &EntryId> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

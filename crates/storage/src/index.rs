//! Secondary index by project
//!
//! Maps project id → (insertion sequence → entity id). Listing a project walks
//! the inner BTreeMap, so results come back in insertion order without
//! scanning the whole table.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

/// Secondary index: project id → entity ids in insertion order
#[derive(Debug, Default)]
pub struct ProjectIndex {
    index: FxHashMap<String, BTreeMap<u64, String>>,
}

impl ProjectIndex {
    /// Create a new empty ProjectIndex
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity under its insertion sequence
    pub fn insert(&mut self, project_id: &str, seq: u64, entity_id: &str) {
        self.index
            .entry(project_id.to_string())
            .or_default()
            .insert(seq, entity_id.to_string());
    }

    /// Remove an entity
    ///
    /// If the project becomes empty, the project entry is removed entirely
    /// to avoid accumulating empty maps.
    pub fn remove(&mut self, project_id: &str, seq: u64) {
        if let Some(entries) = self.index.get_mut(project_id) {
            entries.remove(&seq);
            if entries.is_empty() {
                self.index.remove(project_id);
            }
        }
    }

    /// Entity ids of a project in insertion order
    pub fn entities(&self, project_id: &str) -> impl Iterator<Item = &str> {
        self.index
            .get(project_id)
            .into_iter()
            .flat_map(|entries| entries.values().map(String::as_str))
    }

    /// Number of entities in a project
    pub fn project_len(&self, project_id: &str) -> usize {
        self.index.get(project_id).map_or(0, BTreeMap::len)
    }

    /// Number of projects in the index
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

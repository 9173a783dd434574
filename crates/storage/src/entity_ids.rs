//! Entity identity bookkeeping
//!
//! The EntityIdManager is the single source of truth for which vector and
//! graph identifiers belong to a logical entity. It has no dependency on the
//! other components; the transaction coordinator dispatches `mapping` steps
//! to it and the consistency checker reads it as scan input.
//!
//! ## Invariants
//!
//! - `create_mapping` is an atomic check-and-insert: two concurrent creates of
//!   the same entity id cannot both succeed
//! - `update_mapping` never drops a field the patch does not explicitly clear
//! - `get_mappings_by_project` returns a snapshot taken at call time, in
//!   insertion order

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use tandem_core::{
    EntityMapping, EntityType, MappingPatch, MappingStore, ObjectKind, SyncStatus, TandemError,
    TandemResult,
};

use crate::mapping::MemoryMappingStore;

/// Canonical entity → store identifier mapping
pub struct EntityIdManager {
    store: Arc<dyn MappingStore>,
}

impl EntityIdManager {
    /// Create a manager over a mapping table
    pub fn new(store: Arc<dyn MappingStore>) -> Self {
        Self { store }
    }

    /// Create a manager over a fresh in-memory table
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryMappingStore::new()))
    }

    /// Generate a fresh entity id (UUID v4)
    pub fn generate_entity_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Create a mapping
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for an empty entity or project id
    /// - `DuplicateEntity` if the entity id is already mapped
    pub fn create_mapping(
        &self,
        entity_id: &str,
        entity_type: EntityType,
        project_id: &str,
        vector_id: Option<String>,
        graph_id: Option<String>,
    ) -> TandemResult<EntityMapping> {
        if entity_id.is_empty() {
            return Err(TandemError::invalid_input("entity id must not be empty"));
        }
        if project_id.is_empty() {
            return Err(TandemError::invalid_input("project id must not be empty"));
        }

        let mapping = EntityMapping::new(entity_id, entity_type, project_id, vector_id, graph_id);
        self.store.insert(mapping.clone())?;
        debug!(
            entity_id,
            project_id,
            vector_id = ?mapping.vector_id,
            graph_id = ?mapping.graph_id,
            "Mapping created"
        );
        Ok(mapping)
    }

    /// Merge a patch into a mapping
    ///
    /// # Errors
    ///
    /// `NotFound` if the entity id is unknown.
    pub fn update_mapping(&self, entity_id: &str, patch: &MappingPatch) -> TandemResult<EntityMapping> {
        let updated = self.store.update(entity_id, &mut |mapping| {
            mapping.apply(patch);
            Ok(())
        })?;
        debug!(
            entity_id,
            vector_id = ?updated.vector_id,
            graph_id = ?updated.graph_id,
            status = ?updated.sync_status,
            "Mapping updated"
        );
        Ok(updated)
    }

    /// Get a mapping
    pub fn get_mapping(&self, entity_id: &str) -> TandemResult<Option<EntityMapping>> {
        self.store.get(entity_id)
    }

    /// Get a mapping or fail with `NotFound`
    pub fn require_mapping(&self, entity_id: &str) -> TandemResult<EntityMapping> {
        self.store
            .get(entity_id)?
            .ok_or_else(|| TandemError::not_found(ObjectKind::Mapping, entity_id))
    }

    /// Mappings of a project in insertion order (snapshot at call time)
    pub fn get_mappings_by_project(&self, project_id: &str) -> TandemResult<Vec<EntityMapping>> {
        self.store.list_by_project(project_id)
    }

    /// Delete a mapping; returns whether it existed
    pub fn delete_mapping(&self, entity_id: &str) -> TandemResult<bool> {
        let removed = self.store.delete(entity_id)?.is_some();
        if removed {
            debug!(entity_id, "Mapping deleted");
        }
        Ok(removed)
    }

    /// Find the mapping of a project that owns a vector id
    pub fn find_by_vector_id(
        &self,
        project_id: &str,
        vector_id: &str,
    ) -> TandemResult<Option<EntityMapping>> {
        Ok(self
            .store
            .list_by_project(project_id)?
            .into_iter()
            .find(|m| m.vector_id.as_deref() == Some(vector_id)))
    }

    /// Find the mapping of a project that owns a graph id
    pub fn find_by_graph_id(
        &self,
        project_id: &str,
        graph_id: &str,
    ) -> TandemResult<Option<EntityMapping>> {
        Ok(self
            .store
            .list_by_project(project_id)?
            .into_iter()
            .find(|m| m.graph_id.as_deref() == Some(graph_id)))
    }

    /// Confirm a mapping as synced
    ///
    /// # Errors
    ///
    /// `InvalidInput` if either id is absent; `NotFound` if unknown.
    pub fn mark_synced(&self, entity_id: &str) -> TandemResult<EntityMapping> {
        self.store.update(entity_id, &mut |mapping| {
            if !(mapping.has_vector() && mapping.has_graph()) {
                return Err(TandemError::invalid_input(format!(
                    "mapping {} cannot be synced with a missing side",
                    mapping.entity_id
                )));
            }
            mapping.apply(&MappingPatch::new().sync_status(SyncStatus::Synced));
            Ok(())
        })
    }

    /// Flag a mapping whose two sides disagree
    pub fn mark_conflict(&self, entity_id: &str) -> TandemResult<EntityMapping> {
        self.update_mapping(entity_id, &MappingPatch::new().sync_status(SyncStatus::Conflict))
    }

    /// Number of mappings in the table
    pub fn mapping_count(&self) -> usize {
        self.store.len()
    }
}

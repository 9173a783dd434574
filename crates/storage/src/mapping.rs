//! In-memory entity mapping table
//!
//! One `parking_lot::RwLock` guards both the rows and the project index, so
//! check-and-insert and read-modify-write are atomic with respect to each
//! other. The lock is never held across an `.await`; callers are sync.
//!
//! # Design Notes
//!
//! - Rows carry an insertion sequence so `list_by_project` is insertion ordered
//! - `list_by_project` clones rows under the read lock (snapshot at call time)
//! - `entity_id` and `project_id` are immutable through `update`

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use tandem_core::{EntityMapping, MappingStore, ObjectKind, TandemError, TandemResult};

use crate::index::ProjectIndex;

#[derive(Debug, Default)]
struct MappingTable {
    rows: FxHashMap<String, (u64, EntityMapping)>,
    projects: ProjectIndex,
    next_seq: u64,
}

/// RwLock-guarded mapping table with a project index
#[derive(Debug, Default)]
pub struct MemoryMappingStore {
    table: RwLock<MappingTable>,
}

impl MemoryMappingStore {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }
}

impl MappingStore for MemoryMappingStore {
    fn get(&self, entity_id: &str) -> TandemResult<Option<EntityMapping>> {
        Ok(self
            .table
            .read()
            .rows
            .get(entity_id)
            .map(|(_, mapping)| mapping.clone()))
    }

    fn insert(&self, mapping: EntityMapping) -> TandemResult<()> {
        let mut table = self.table.write();
        if table.rows.contains_key(&mapping.entity_id) {
            return Err(TandemError::DuplicateEntity {
                entity_id: mapping.entity_id,
            });
        }
        let seq = table.next_seq;
        table.next_seq += 1;
        table
            .projects
            .insert(&mapping.project_id, seq, &mapping.entity_id);
        table.rows.insert(mapping.entity_id.clone(), (seq, mapping));
        Ok(())
    }

    fn update(
        &self,
        entity_id: &str,
        f: &mut dyn FnMut(&mut EntityMapping) -> TandemResult<()>,
    ) -> TandemResult<EntityMapping> {
        let mut table = self.table.write();
        let (_, row) = table
            .rows
            .get_mut(entity_id)
            .ok_or_else(|| TandemError::not_found(ObjectKind::Mapping, entity_id))?;

        let mut draft = row.clone();
        f(&mut draft)?;
        if draft.entity_id != row.entity_id || draft.project_id != row.project_id {
            return Err(TandemError::invalid_input(format!(
                "entity_id and project_id of mapping {} are immutable",
                entity_id
            )));
        }
        *row = draft;
        Ok(row.clone())
    }

    fn list_by_project(&self, project_id: &str) -> TandemResult<Vec<EntityMapping>> {
        let table = self.table.read();
        Ok(table
            .projects
            .entities(project_id)
            .filter_map(|id| table.rows.get(id).map(|(_, mapping)| mapping.clone()))
            .collect())
    }

    fn delete(&self, entity_id: &str) -> TandemResult<Option<EntityMapping>> {
        let mut table = self.table.write();
        match table.rows.remove(entity_id) {
            Some((seq, mapping)) => {
                table.projects.remove(&mapping.project_id, seq);
                Ok(Some(mapping))
            }
            None => Ok(None),
        }
    }

    fn len(&self) -> usize {
        self.table.read().rows.len()
    }
}

//! Per-entity async locks
//!
//! Repairs and syncs of one entity read the mapping, write a store and then
//! write the mapping again. Two of those interleaving on the same entity
//! could each observe the pre-write mapping, so they are serialized here.
//! Unrelated entities never contend.
//!
//! The table only holds entities somebody is holding or waiting on: the last
//! guard to drop removes the entry.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lazily created async mutex per entity id
#[derive(Debug, Default)]
pub struct EntityLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl EntityLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to an entity
    pub async fn lock(&self, entity_id: &str) -> EntityGuard<'_> {
        // Clone the Arc out so no map guard is held across the await
        let lock = self
            .locks
            .entry(entity_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        EntityGuard {
            locks: self,
            entity_id: entity_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of entities currently held or waited on
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no entity is held or waited on
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one entity; released on drop
#[derive(Debug)]
pub struct EntityGuard<'a> {
    locks: &'a EntityLocks,
    entity_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for EntityGuard<'_> {
    fn drop(&mut self) {
        // Release first so the guard's own reference is gone
        drop(self.guard.take());
        // Waiters hold a clone of the Arc, and new lockers clone it under the
        // shard lock this check also takes
        self.locks
            .locks
            .remove_if(&self.entity_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

//! Entity-level operations across both stores
//!
//! The EntityMappingService is the write path of the indexing pipeline. Every
//! cross-store write goes through the transaction coordinator, so a failure on
//! one store undoes what was already written to the other.
//!
//! ## Entity ids
//!
//! `create_entity` takes the entity id from the vector payload, then the
//! graph payload, and generates a UUID only when neither carries one. Both
//! payloads are stored under that id, so each store can be joined back to the
//! mapping.
//!
//! ## Batches
//!
//! A batch is a named list of create/update intents held until it is
//! executed. Execution runs the items one by one, isolates per-item failures
//! and consumes the batch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tandem_concurrency::TransactionCoordinator;
use tandem_core::{
    BatchId, Chunk, EntityMapping, EntityType, MappingOp, ObjectKind, StepType, TandemError,
    TandemResult, TransactionOperation,
};
use tandem_storage::EntityIdManager;

use crate::comparator::{FingerprintComparator, PayloadComparator};
use crate::locks::EntityLocks;
use crate::sides::{self, Side};

/// Outcome of a successful `create_entity`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCreation {
    /// The new entity
    pub entity_id: String,
    /// Vector id, if a vector payload was given
    pub vector_id: Option<String>,
    /// Graph id, if a graph payload was given
    pub graph_id: Option<String>,
}

/// Outcome of syncing one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Synced entity
    pub entity_id: String,
    /// Both sides present and confirmed
    pub success: bool,
    /// Failure detail
    pub error: Option<String>,
    /// Vector id after the sync
    pub vector_id: Option<String>,
    /// Graph id after the sync
    pub graph_id: Option<String>,
}

impl SyncResult {
    fn synced(mapping: &EntityMapping) -> Self {
        Self {
            entity_id: mapping.entity_id.clone(),
            success: true,
            error: None,
            vector_id: mapping.vector_id.clone(),
            graph_id: mapping.graph_id.clone(),
        }
    }

    fn failed(mapping: &EntityMapping, error: &TandemError) -> Self {
        Self {
            entity_id: mapping.entity_id.clone(),
            success: false,
            error: Some(error.to_string()),
            vector_id: mapping.vector_id.clone(),
            graph_id: mapping.graph_id.clone(),
        }
    }
}

/// One intent in a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum BatchItem {
    /// `create_entity`
    Create {
        /// Kind of entity
        entity_type: EntityType,
        /// Owning project
        project_id: String,
        /// Vector side payload
        vector_payload: Option<Chunk>,
        /// Graph side payload
        graph_payload: Option<Chunk>,
    },
    /// `update_entity`
    Update {
        /// Entity to rewrite
        entity_id: String,
        /// New vector side payload
        vector_payload: Option<Chunk>,
        /// New graph side payload
        graph_payload: Option<Chunk>,
    },
}

/// Outcome of one batch item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemResult {
    /// Position in the batch
    pub index: usize,
    /// Whether the item succeeded
    pub success: bool,
    /// Entity created or updated (known for updates even on failure)
    pub entity_id: Option<String>,
    /// Vector id after the item
    pub vector_id: Option<String>,
    /// Graph id after the item
    pub graph_id: Option<String>,
    /// Failure detail
    pub error: Option<String>,
}

/// Outcome of executing a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Executed batch
    pub batch_id: BatchId,
    /// Batch name
    pub name: String,
    /// One result per item, in item order
    pub results: Vec<BatchItemResult>,
}

impl BatchReport {
    /// Number of successful items
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    /// Number of failed items
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

/// A batch waiting to be executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingBatch {
    /// Batch identifier
    pub id: BatchId,
    /// Caller-chosen name
    pub name: String,
    /// Intents in execution order
    pub items: Vec<BatchItem>,
    /// When the batch was created
    pub created_at: DateTime<Utc>,
}

/// Create, update and sync entities across both stores
pub struct EntityMappingService {
    coordinator: Arc<TransactionCoordinator>,
    comparator: Arc<dyn PayloadComparator>,
    locks: Arc<EntityLocks>,
    batches: DashMap<BatchId, PendingBatch>,
}

impl EntityMappingService {
    /// Create a service writing through a coordinator
    pub fn new(coordinator: Arc<TransactionCoordinator>) -> Self {
        Self {
            coordinator,
            comparator: Arc::new(FingerprintComparator),
            locks: Arc::new(EntityLocks::new()),
            batches: DashMap::new(),
        }
    }

    /// Replace the content comparison used to confirm synced entities
    pub fn with_comparator(mut self, comparator: Arc<dyn PayloadComparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Share per-entity locks with other services
    pub fn with_locks(mut self, locks: Arc<EntityLocks>) -> Self {
        self.locks = locks;
        self
    }

    fn ids(&self) -> &EntityIdManager {
        self.coordinator.entity_ids()
    }

    /// Create an entity in one or both stores
    ///
    /// # Errors
    ///
    /// - `InvalidInput` without a project id or without any payload
    /// - `DuplicateEntity` if the entity id is already mapped
    /// - the triggering failure (usually `StepExecution`) if the write
    ///   transaction failed; whatever it wrote has been compensated
    pub async fn create_entity(
        &self,
        entity_type: EntityType,
        project_id: &str,
        vector_payload: Option<Chunk>,
        graph_payload: Option<Chunk>,
    ) -> TandemResult<EntityCreation> {
        if project_id.is_empty() {
            return Err(TandemError::invalid_input("project id must not be empty"));
        }
        if vector_payload.is_none() && graph_payload.is_none() {
            return Err(TandemError::invalid_input(
                "an entity needs a vector or a graph payload",
            ));
        }

        let entity_id = vector_payload
            .iter()
            .chain(graph_payload.iter())
            .map(|chunk| chunk.id.as_str())
            .find(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(EntityIdManager::generate_entity_id);

        let _guard = self.locks.lock(&entity_id).await;
        if self.ids().get_mapping(&entity_id)?.is_some() {
            return Err(TandemError::DuplicateEntity { entity_id });
        }

        let mut operations = Vec::with_capacity(3);
        if let Some(chunk) = vector_payload {
            operations.push(TransactionOperation::store_vectors(vec![
                chunk.with_id(entity_id.as_str())
            ]));
        }
        if let Some(chunk) = graph_payload {
            operations.push(TransactionOperation::store_nodes(vec![
                chunk.with_id(entity_id.as_str())
            ]));
        }
        operations.push(
            TransactionOperation::new(MappingOp::Bind {
                entity_id: entity_id.clone(),
                entity_type,
                project_id: project_id.to_string(),
            })
            .with_compensation(MappingOp::Delete {
                entity_id: entity_id.clone(),
            }),
        );

        let result = self
            .coordinator
            .execute_transaction(project_id, operations)
            .await?;
        if !result.success {
            warn!(entity_id = %entity_id, project_id, error = ?result.error, "Entity creation failed");
            return Err(result
                .into_error()
                .unwrap_or_else(|| TandemError::internal("transaction failed without an error")));
        }

        let creation = EntityCreation {
            vector_id: result.first_created_id(StepType::Vector).map(str::to_string),
            graph_id: result.first_created_id(StepType::Graph).map(str::to_string),
            entity_id,
        };
        debug!(
            entity_id = %creation.entity_id,
            project_id,
            vector_id = ?creation.vector_id,
            graph_id = ?creation.graph_id,
            "Entity created"
        );
        Ok(creation)
    }

    /// Rewrite one or both sides of an existing entity
    ///
    /// Sides without a payload keep their id. Returns the updated mapping.
    ///
    /// # Errors
    ///
    /// `InvalidInput` without any payload, `NotFound` for an unknown entity,
    /// or the triggering failure of the write transaction.
    pub async fn update_entity(
        &self,
        entity_id: &str,
        vector_payload: Option<Chunk>,
        graph_payload: Option<Chunk>,
    ) -> TandemResult<EntityMapping> {
        let mut writes = Vec::with_capacity(2);
        if let Some(chunk) = vector_payload {
            writes.push((Side::Vector, chunk));
        }
        if let Some(chunk) = graph_payload {
            writes.push((Side::Graph, chunk));
        }
        if writes.is_empty() {
            return Err(TandemError::invalid_input(
                "an update needs a vector or a graph payload",
            ));
        }

        let _guard = self.locks.lock(entity_id).await;
        let mapping = self.ids().require_mapping(entity_id)?;
        let updated = sides::write_sides(&self.coordinator, &mapping, writes).await?;
        debug!(entity_id, "Entity updated");
        Ok(updated)
    }

    /// Bring one entity to a state where both sides exist and agree
    ///
    /// A missing side is written from the other side's stored content (or
    /// from the mapping itself when nothing can be read). When both ids are
    /// set, both objects are read back: a vanished object is rewritten like a
    /// missing side, and diverging content is rewritten on the graph side
    /// from the vector side. The mapping is only confirmed as synced once the
    /// stores agree. Failures are reported in the result, not as `Err`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown entity.
    pub async fn sync_entity(&self, entity_id: &str) -> TandemResult<SyncResult> {
        let _guard = self.locks.lock(entity_id).await;
        let mapping = self.ids().require_mapping(entity_id)?;

        let writes = match self.plan_sync(&mapping).await {
            Ok(writes) => writes,
            Err(e) => {
                warn!(entity_id, error = %e, "Entity sync could not read the stores");
                return Ok(SyncResult::failed(&mapping, &e));
            }
        };

        if !writes.is_empty() {
            if let Err(e) = sides::write_sides(&self.coordinator, &mapping, writes).await {
                warn!(entity_id, error = %e, "Entity sync failed");
                return Ok(SyncResult::failed(&mapping, &e));
            }
        }

        Ok(match self.ids().mark_synced(entity_id) {
            Ok(synced) => {
                info!(entity_id, "Entity synced");
                SyncResult::synced(&synced)
            }
            Err(e) => SyncResult::failed(&mapping, &e),
        })
    }

    /// Sides to write before the entity can be confirmed
    async fn plan_sync(&self, mapping: &EntityMapping) -> TandemResult<Vec<(Side, Chunk)>> {
        let (vector_id, graph_id) = match (&mapping.vector_id, &mapping.graph_id) {
            (Some(v), Some(g)) => (v, g),
            (Some(_), None) => {
                let payload = sides::recover_payload(&self.coordinator, mapping, Side::Graph).await;
                return Ok(vec![(Side::Graph, payload)]);
            }
            (None, Some(_)) => {
                let payload = sides::recover_payload(&self.coordinator, mapping, Side::Vector).await;
                return Ok(vec![(Side::Vector, payload)]);
            }
            (None, None) => {
                let payload = sides::mapping_payload(mapping);
                return Ok(vec![(Side::Vector, payload.clone()), (Side::Graph, payload)]);
            }
        };

        let vector = Side::Vector.fetch(&self.coordinator, vector_id).await?;
        let graph = Side::Graph.fetch(&self.coordinator, graph_id).await?;
        Ok(match (vector, graph) {
            (Some(v), Some(g)) if self.comparator.matches(&v, &g) => Vec::new(),
            (Some(v), _) => vec![(Side::Graph, v)],
            (None, Some(g)) => vec![(Side::Vector, g)],
            (None, None) => {
                let payload = sides::mapping_payload(mapping);
                vec![(Side::Vector, payload.clone()), (Side::Graph, payload)]
            }
        })
    }

    /// Sync every mapping of a project that is not already synced
    ///
    /// One result per such mapping; a failure never stops the rest.
    pub async fn sync_project(&self, project_id: &str) -> TandemResult<Vec<SyncResult>> {
        let mappings = self.ids().get_mappings_by_project(project_id)?;
        let mut results = Vec::new();
        for mapping in mappings.iter().filter(|m| !m.is_consistent()) {
            let result = match self.sync_entity(&mapping.entity_id).await {
                Ok(result) => result,
                Err(e) => SyncResult::failed(mapping, &e),
            };
            results.push(result);
        }
        info!(
            project_id,
            synced = results.iter().filter(|r| r.success).count(),
            failed = results.iter().filter(|r| !r.success).count(),
            "Project sync finished"
        );
        Ok(results)
    }

    /// Register a named batch for later execution
    pub fn create_batch(&self, name: &str, items: Vec<BatchItem>) -> BatchId {
        let batch = PendingBatch {
            id: BatchId::new(),
            name: name.to_string(),
            items,
            created_at: Utc::now(),
        };
        let id = batch.id;
        debug!(batch_id = %id, name, items = batch.items.len(), "Batch created");
        self.batches.insert(id, batch);
        id
    }

    /// Execute and consume a batch
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown or already executed batch.
    pub async fn execute_batch(&self, batch_id: BatchId) -> TandemResult<BatchReport> {
        let (_, batch) = self
            .batches
            .remove(&batch_id)
            .ok_or_else(|| TandemError::not_found(ObjectKind::Batch, batch_id))?;

        let mut results = Vec::with_capacity(batch.items.len());
        for (index, item) in batch.items.into_iter().enumerate() {
            results.push(self.execute_item(index, item).await);
        }

        let report = BatchReport {
            batch_id,
            name: batch.name,
            results,
        };
        info!(
            batch_id = %batch_id,
            name = %report.name,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Batch executed"
        );
        Ok(report)
    }

    async fn execute_item(&self, index: usize, item: BatchItem) -> BatchItemResult {
        match item {
            BatchItem::Create {
                entity_type,
                project_id,
                vector_payload,
                graph_payload,
            } => match self
                .create_entity(entity_type, &project_id, vector_payload, graph_payload)
                .await
            {
                Ok(created) => BatchItemResult {
                    index,
                    success: true,
                    entity_id: Some(created.entity_id),
                    vector_id: created.vector_id,
                    graph_id: created.graph_id,
                    error: None,
                },
                Err(e) => BatchItemResult {
                    index,
                    success: false,
                    entity_id: None,
                    vector_id: None,
                    graph_id: None,
                    error: Some(e.to_string()),
                },
            },
            BatchItem::Update {
                entity_id,
                vector_payload,
                graph_payload,
            } => match self
                .update_entity(&entity_id, vector_payload, graph_payload)
                .await
            {
                Ok(mapping) => BatchItemResult {
                    index,
                    success: true,
                    entity_id: Some(entity_id),
                    vector_id: mapping.vector_id,
                    graph_id: mapping.graph_id,
                    error: None,
                },
                Err(e) => BatchItemResult {
                    index,
                    success: false,
                    entity_id: Some(entity_id),
                    vector_id: None,
                    graph_id: None,
                    error: Some(e.to_string()),
                },
            },
        }
    }

    /// Batches created but not yet executed, oldest first
    pub fn pending_batches(&self) -> Vec<PendingBatch> {
        let mut pending: Vec<PendingBatch> =
            self.batches.iter().map(|e| e.value().clone()).collect();
        pending.sort_by_key(|b| b.created_at);
        pending
    }
}

//! Step dispatch
//!
//! Routes one [`StepOperation`] to the store it targets. The operation set is
//! closed, so every variant is handled here and nowhere else.
//!
//! Error shape:
//! - vector and graph failures surface as `StepExecution` tagged with the store
//! - mapping failures keep their own variant (`DuplicateEntity`, `NotFound`)
//!
//! A bulk store whose report carries item errors fails the whole step. The
//! ids it did create are deleted before the error is returned, because a
//! failed step is never marked executed and so is never compensated.

use std::sync::Arc;

use tracing::warn;

use tandem_core::{
    GraphOp, GraphStore, MappingOp, MappingPatch, StepOperation, StepType, StoreOptions,
    StoreReport, TandemError, TandemResult, TransactionStep, VectorOp, VectorStore,
};
use tandem_storage::EntityIdManager;

/// Dispatches transaction steps to the vector store, graph store and mapping table
pub struct StepDispatcher {
    vector: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    ids: Arc<EntityIdManager>,
}

impl StepDispatcher {
    /// Create a dispatcher over the three collaborators
    pub fn new(
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        ids: Arc<EntityIdManager>,
    ) -> Self {
        Self { vector, graph, ids }
    }

    /// Vector store collaborator
    pub fn vector(&self) -> &Arc<dyn VectorStore> {
        &self.vector
    }

    /// Graph store collaborator
    pub fn graph(&self) -> &Arc<dyn GraphStore> {
        &self.graph
    }

    /// Mapping table
    pub fn entity_ids(&self) -> &Arc<EntityIdManager> {
        &self.ids
    }

    /// Run one operation and return the ids it created
    ///
    /// `prior` holds the steps before this one in the same transaction; mapping
    /// operations read the vector and graph ids those steps created.
    pub async fn dispatch(
        &self,
        project_id: &str,
        operation: &StepOperation,
        prior: &[TransactionStep],
    ) -> TandemResult<Vec<String>> {
        match operation {
            StepOperation::Vector(op) => self.vector_op(project_id, op).await,
            StepOperation::Graph(op) => self.graph_op(project_id, op).await,
            StepOperation::Mapping(op) => self.mapping_op(op, prior),
        }
    }

    async fn vector_op(&self, project_id: &str, op: &VectorOp) -> TandemResult<Vec<String>> {
        match op {
            VectorOp::StoreChunks { chunks } => {
                let report = self
                    .vector
                    .store_chunks(chunks, &StoreOptions::for_project(project_id))
                    .await
                    .map_err(|e| step_error(StepType::Vector, e))?;
                self.accept_report(StepType::Vector, report).await
            }
            VectorOp::DeleteChunks { ids } => {
                if !ids.is_empty() {
                    self.vector
                        .delete_chunks(ids)
                        .await
                        .map_err(|e| step_error(StepType::Vector, e))?;
                }
                Ok(Vec::new())
            }
        }
    }

    async fn graph_op(&self, project_id: &str, op: &GraphOp) -> TandemResult<Vec<String>> {
        match op {
            GraphOp::StoreChunks { chunks } => {
                let report = self
                    .graph
                    .store_chunks(chunks, &StoreOptions::for_project(project_id))
                    .await
                    .map_err(|e| step_error(StepType::Graph, e))?;
                self.accept_report(StepType::Graph, report).await
            }
            GraphOp::DeleteNodes { ids } => {
                if !ids.is_empty() {
                    self.graph
                        .delete_nodes(ids)
                        .await
                        .map_err(|e| step_error(StepType::Graph, e))?;
                }
                Ok(Vec::new())
            }
        }
    }

    fn mapping_op(&self, op: &MappingOp, prior: &[TransactionStep]) -> TandemResult<Vec<String>> {
        match op {
            MappingOp::Bind {
                entity_id,
                entity_type,
                project_id,
            } => {
                self.ids.create_mapping(
                    entity_id,
                    entity_type.clone(),
                    project_id,
                    first_created(prior, StepType::Vector),
                    first_created(prior, StepType::Graph),
                )?;
                Ok(vec![entity_id.clone()])
            }
            MappingOp::Link { entity_id } => {
                let mut patch = MappingPatch::new();
                if let Some(id) = first_created(prior, StepType::Vector) {
                    patch = patch.vector_id(id);
                }
                if let Some(id) = first_created(prior, StepType::Graph) {
                    patch = patch.graph_id(id);
                }
                if patch.is_empty() {
                    // Still surface an unknown entity
                    self.ids.require_mapping(entity_id)?;
                } else {
                    self.ids.update_mapping(entity_id, &patch)?;
                }
                Ok(Vec::new())
            }
            MappingOp::Delete { entity_id } => {
                self.ids.delete_mapping(entity_id)?;
                Ok(Vec::new())
            }
        }
    }

    /// Turn a bulk-store report into the step outcome
    async fn accept_report(
        &self,
        step_type: StepType,
        report: StoreReport,
    ) -> TandemResult<Vec<String>> {
        if report.is_clean() {
            return Ok(report.created_ids);
        }

        if !report.created_ids.is_empty() {
            let cleanup = match step_type {
                StepType::Graph => self.graph.delete_nodes(&report.created_ids).await,
                _ => self.vector.delete_chunks(&report.created_ids).await,
            };
            if let Err(e) = cleanup {
                warn!(
                    store = %step_type,
                    ids = ?report.created_ids,
                    error = %e,
                    "Failed to remove partially stored objects"
                );
            }
        }

        let message = if report.errors.is_empty() {
            "store reported failure".to_string()
        } else {
            report.errors.join("; ")
        };
        Err(TandemError::step_failed(step_type, message))
    }
}

/// First id created by an executed earlier step of a type
fn first_created(prior: &[TransactionStep], step_type: StepType) -> Option<String> {
    prior
        .iter()
        .filter(|s| s.executed && s.step_type == step_type)
        .flat_map(|s| s.created_ids.iter())
        .next()
        .cloned()
}

fn step_error(step_type: StepType, err: TandemError) -> TandemError {
    match err {
        TandemError::StepExecution { .. } => err,
        other => TandemError::step_failed(step_type, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::{Chunk, EntityType, SyncStatus, TransactionOperation};
    use tandem_storage::testing::MemoryStore;

    struct Fixture {
        vector: Arc<MemoryStore>,
        graph: Arc<MemoryStore>,
        ids: Arc<EntityIdManager>,
        dispatcher: StepDispatcher,
    }

    fn fixture() -> Fixture {
        let vector = Arc::new(MemoryStore::vector());
        let graph = Arc::new(MemoryStore::graph());
        let ids = Arc::new(EntityIdManager::in_memory());
        let dispatcher = StepDispatcher::new(vector.clone(), graph.clone(), ids.clone());
        Fixture {
            vector,
            graph,
            ids,
            dispatcher,
        }
    }

    fn executed(op: TransactionOperation, created: &[&str]) -> TransactionStep {
        let mut step = TransactionStep::from_operation(op).unwrap();
        step.executed = true;
        step.created_ids = created.iter().map(|s| s.to_string()).collect();
        step
    }

    #[tokio::test]
    async fn test_store_returns_created_ids() {
        let fx = fixture();
        let op = StepOperation::from(VectorOp::StoreChunks {
            chunks: vec![Chunk::new("f1", "hello")],
        });
        let created = fx.dispatcher.dispatch("p1", &op, &[]).await.unwrap();
        assert_eq!(created, vec!["vector_f1"]);
        assert!(fx.vector.contains("vector_f1"));
    }

    #[tokio::test]
    async fn test_store_error_is_tagged_with_store() {
        let fx = fixture();
        fx.graph.fail_next_stores(1);
        let op = StepOperation::from(GraphOp::StoreChunks {
            chunks: vec![Chunk::new("f1", "hello")],
        });
        let err = fx.dispatcher.dispatch("p1", &op, &[]).await.unwrap_err();
        assert!(matches!(
            err,
            TandemError::StepExecution { step_type: StepType::Graph, .. }
        ));
    }

    #[tokio::test]
    async fn test_partial_report_fails_and_cleans_up() {
        let fx = fixture();
        fx.vector.fail_chunk("b");
        let op = StepOperation::from(VectorOp::StoreChunks {
            chunks: vec![Chunk::new("a", "x"), Chunk::new("b", "y")],
        });
        let err = fx.dispatcher.dispatch("p1", &op, &[]).await.unwrap_err();
        assert!(err.to_string().contains("injected item failure"));
        assert!(fx.vector.is_empty());
        assert_eq!(fx.vector.journal().deletes()[0].ids, vec!["vector_a"]);
    }

    #[tokio::test]
    async fn test_empty_delete_skips_store_call() {
        let fx = fixture();
        let op = StepOperation::from(GraphOp::DeleteNodes { ids: vec![] });
        fx.dispatcher.dispatch("p1", &op, &[]).await.unwrap();
        assert!(fx.graph.journal().is_empty());
    }

    #[tokio::test]
    async fn test_bind_uses_prior_created_ids() {
        let fx = fixture();
        let prior = vec![
            executed(TransactionOperation::store_vectors(vec![]), &["vector_f1"]),
            executed(TransactionOperation::store_nodes(vec![]), &["graph_f1"]),
        ];
        let op = StepOperation::from(MappingOp::Bind {
            entity_id: "f1".into(),
            entity_type: EntityType::File,
            project_id: "p1".into(),
        });
        fx.dispatcher.dispatch("p1", &op, &prior).await.unwrap();

        let mapping = fx.ids.require_mapping("f1").unwrap();
        assert_eq!(mapping.vector_id.as_deref(), Some("vector_f1"));
        assert_eq!(mapping.graph_id.as_deref(), Some("graph_f1"));
        assert_eq!(mapping.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_bind_duplicate_keeps_variant() {
        let fx = fixture();
        fx.ids
            .create_mapping("f1", EntityType::File, "p1", None, None)
            .unwrap();
        let op = StepOperation::from(MappingOp::Bind {
            entity_id: "f1".into(),
            entity_type: EntityType::File,
            project_id: "p1".into(),
        });
        let err = fx.dispatcher.dispatch("p1", &op, &[]).await.unwrap_err();
        assert!(matches!(err, TandemError::DuplicateEntity { .. }));
    }

    #[tokio::test]
    async fn test_link_preserves_other_side() {
        let fx = fixture();
        fx.ids
            .create_mapping("f1", EntityType::File, "p1", Some("vector_f1".into()), None)
            .unwrap();
        let prior = vec![executed(
            TransactionOperation::store_nodes(vec![]),
            &["graph_f1"],
        )];
        let op = StepOperation::from(MappingOp::Link {
            entity_id: "f1".into(),
        });
        fx.dispatcher.dispatch("p1", &op, &prior).await.unwrap();

        let mapping = fx.ids.require_mapping("f1").unwrap();
        assert_eq!(mapping.vector_id.as_deref(), Some("vector_f1"));
        assert_eq!(mapping.graph_id.as_deref(), Some("graph_f1"));
    }

    #[tokio::test]
    async fn test_link_unknown_entity_is_not_found() {
        let fx = fixture();
        let op = StepOperation::from(MappingOp::Link {
            entity_id: "ghost".into(),
        });
        let err = fx.dispatcher.dispatch("p1", &op, &[]).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_mapping_delete_is_idempotent() {
        let fx = fixture();
        let op = StepOperation::from(MappingOp::Delete {
            entity_id: "never".into(),
        });
        assert!(fx.dispatcher.dispatch("p1", &op, &[]).await.unwrap().is_empty());
    }
}

//! Reading and writing one side of an entity
//!
//! Sync and repair both fill in or rewrite the vector or graph side of an
//! existing mapping. They share the same shape: recover a payload, run one
//! transaction that stores it and links the new id onto the mapping, then
//! drop the object the new write replaced.

use tracing::{debug, warn};

use tandem_concurrency::TransactionCoordinator;
use tandem_core::{
    Chunk, EntityMapping, GraphOp, MappingOp, StepType, TandemError, TandemResult,
    TransactionOperation, VectorOp,
};

/// One of the two stores an entity lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Vector store
    Vector,
    /// Graph store
    Graph,
}

impl Side {
    /// The opposite store
    pub fn other(self) -> Side {
        match self {
            Side::Vector => Side::Graph,
            Side::Graph => Side::Vector,
        }
    }

    /// Step type writes to this side are dispatched as
    pub fn step_type(self) -> StepType {
        match self {
            Side::Vector => StepType::Vector,
            Side::Graph => StepType::Graph,
        }
    }

    /// This side's id on a mapping
    pub fn id_of(self, mapping: &EntityMapping) -> Option<&str> {
        match self {
            Side::Vector => mapping.vector_id.as_deref(),
            Side::Graph => mapping.graph_id.as_deref(),
        }
    }

    /// Bulk store of one chunk, compensated by deleting what it created
    /// only when `compensate` is set
    pub fn store_operation(self, chunk: Chunk, compensate: bool) -> TransactionOperation {
        match (self, compensate) {
            (Side::Vector, true) => TransactionOperation::store_vectors(vec![chunk]),
            (Side::Graph, true) => TransactionOperation::store_nodes(vec![chunk]),
            (Side::Vector, false) => {
                TransactionOperation::new(VectorOp::StoreChunks { chunks: vec![chunk] })
            }
            (Side::Graph, false) => {
                TransactionOperation::new(GraphOp::StoreChunks { chunks: vec![chunk] })
            }
        }
    }

    /// Stored object of this side
    pub async fn fetch(
        self,
        coordinator: &TransactionCoordinator,
        id: &str,
    ) -> TandemResult<Option<Chunk>> {
        match self {
            Side::Vector => coordinator.vector().get_chunk(id).await,
            Side::Graph => coordinator.graph().get_node(id).await,
        }
    }

    /// Delete objects of this side
    pub async fn delete(
        self,
        coordinator: &TransactionCoordinator,
        ids: &[String],
    ) -> TandemResult<()> {
        match self {
            Side::Vector => coordinator.vector().delete_chunks(ids).await,
            Side::Graph => coordinator.graph().delete_nodes(ids).await,
        }
    }
}

/// Payload built from the mapping alone
pub fn mapping_payload(mapping: &EntityMapping) -> Chunk {
    Chunk::new(mapping.entity_id.as_str(), "")
        .with_metadata("entity_type", mapping.entity_type.as_str())
        .with_metadata("project_id", mapping.project_id.as_str())
}

/// Payload for writing `target` recovered from the other side's stored object
///
/// Falls back to [`mapping_payload`] when the other side is absent,
/// unreadable or gone.
pub async fn recover_payload(
    coordinator: &TransactionCoordinator,
    mapping: &EntityMapping,
    target: Side,
) -> Chunk {
    let source = target.other();
    let Some(id) = source.id_of(mapping) else {
        return mapping_payload(mapping);
    };
    match source.fetch(coordinator, id).await {
        Ok(Some(chunk)) => chunk.with_id(mapping.entity_id.as_str()),
        Ok(None) => mapping_payload(mapping),
        Err(e) => {
            warn!(
                entity_id = %mapping.entity_id,
                source = ?source,
                error = %e,
                "Could not read payload source, using mapping data"
            );
            mapping_payload(mapping)
        }
    }
}

/// Write the given sides of an existing entity in one transaction
///
/// The mapping keeps every id that is not rewritten. A side that was absent
/// is compensated if the transaction fails later; a side that existed is not,
/// since its previous content cannot be restored. When a rewrite reports a
/// new id, the replaced object is deleted best effort.
///
/// Returns the mapping as it stands after the write.
pub async fn write_sides(
    coordinator: &TransactionCoordinator,
    mapping: &EntityMapping,
    writes: Vec<(Side, Chunk)>,
) -> TandemResult<EntityMapping> {
    if writes.is_empty() {
        return Err(TandemError::invalid_input("no side to write"));
    }

    let sides: Vec<Side> = writes.iter().map(|(side, _)| *side).collect();
    let mut operations: Vec<TransactionOperation> = writes
        .into_iter()
        .map(|(side, chunk)| {
            let compensate = side.id_of(mapping).is_none();
            side.store_operation(chunk.with_id(mapping.entity_id.as_str()), compensate)
        })
        .collect();
    operations.push(TransactionOperation::new(MappingOp::Link {
        entity_id: mapping.entity_id.clone(),
    }));

    let result = coordinator
        .execute_transaction(&mapping.project_id, operations)
        .await?;
    if !result.success {
        return Err(result
            .into_error()
            .unwrap_or_else(|| TandemError::internal("transaction failed without an error")));
    }

    for side in sides {
        let Some(new_id) = result.first_created_id(side.step_type()) else {
            return Err(TandemError::step_failed(
                side.step_type(),
                "store reported success without an id",
            ));
        };
        if let Some(old_id) = side.id_of(mapping).filter(|old| *old != new_id) {
            if let Err(e) = side.delete(coordinator, &[old_id.to_string()]).await {
                warn!(
                    entity_id = %mapping.entity_id,
                    old_id,
                    error = %e,
                    "Failed to delete replaced object"
                );
            }
        }
        debug!(entity_id = %mapping.entity_id, side = ?side, new_id, "Side written");
    }

    coordinator.entity_ids().require_mapping(&mapping.entity_id)
}

//! Operation descriptors dispatched by the transaction coordinator
//!
//! Every step of a transaction carries one [`StepOperation`]. The variants
//! form a closed set per store so the dispatcher matches exhaustively:
//!
//! - `VectorOp = StoreChunks | DeleteChunks`
//! - `GraphOp = StoreChunks | DeleteNodes`
//! - `MappingOp = Bind | Link | Delete`
//!
//! Compensating deletes are completed at compensation time with the ids the
//! forward step reported creating, so callers can describe the inverse of a
//! store call before they know which ids it will produce.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TandemError, TandemResult};
use crate::payload::Chunk;
use crate::types::EntityType;

/// Store a step is dispatched to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Vector store collaborator
    Vector,
    /// Graph store collaborator
    Graph,
    /// Entity id manager
    Mapping,
}

impl StepType {
    /// String tag for this step type
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Vector => "vector",
            StepType::Graph => "graph",
            StepType::Mapping => "mapping",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepType {
    type Err = TandemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vector" => Ok(StepType::Vector),
            "graph" => Ok(StepType::Graph),
            "mapping" => Ok(StepType::Mapping),
            other => Err(TandemError::UnknownOperationType(other.to_string())),
        }
    }
}

/// Vector store operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum VectorOp {
    /// Bulk write of chunks
    StoreChunks {
        /// Chunks to store
        chunks: Vec<Chunk>,
    },
    /// Bulk delete by vector id
    DeleteChunks {
        /// Ids to delete (extended with the forward step's created ids when compensating)
        ids: Vec<String>,
    },
}

/// Graph store operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GraphOp {
    /// Bulk write of chunks as graph nodes
    StoreChunks {
        /// Chunks to store
        chunks: Vec<Chunk>,
    },
    /// Bulk delete by node id
    DeleteNodes {
        /// Ids to delete (extended with the forward step's created ids when compensating)
        ids: Vec<String>,
    },
}

/// Entity mapping operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MappingOp {
    /// Create a mapping from the ids produced by earlier steps of the same transaction
    Bind {
        /// Entity to create
        entity_id: String,
        /// Kind of entity
        entity_type: EntityType,
        /// Owning project
        project_id: String,
    },
    /// Set the ids produced by earlier steps on an existing mapping, keeping the rest
    Link {
        /// Entity to update
        entity_id: String,
    },
    /// Remove a mapping (absent mappings are not an error)
    Delete {
        /// Entity to remove
        entity_id: String,
    },
}

/// Operation carried by one transaction step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "store", content = "op", rename_all = "snake_case")]
pub enum StepOperation {
    /// Vector store operation
    Vector(VectorOp),
    /// Graph store operation
    Graph(GraphOp),
    /// Mapping table operation
    Mapping(MappingOp),
}

impl StepOperation {
    /// Step type this operation is dispatched to
    pub fn step_type(&self) -> StepType {
        match self {
            StepOperation::Vector(_) => StepType::Vector,
            StepOperation::Graph(_) => StepType::Graph,
            StepOperation::Mapping(_) => StepType::Mapping,
        }
    }

    /// Operation tag, e.g. `storeChunks`
    pub fn kind(&self) -> &'static str {
        match self {
            StepOperation::Vector(VectorOp::StoreChunks { .. })
            | StepOperation::Graph(GraphOp::StoreChunks { .. }) => "storeChunks",
            StepOperation::Vector(VectorOp::DeleteChunks { .. }) => "deleteChunks",
            StepOperation::Graph(GraphOp::DeleteNodes { .. }) => "deleteNodes",
            StepOperation::Mapping(MappingOp::Bind { .. }) => "bind",
            StepOperation::Mapping(MappingOp::Link { .. }) => "link",
            StepOperation::Mapping(MappingOp::Delete { .. }) => "delete",
        }
    }

    /// Complete a compensating delete with ids the forward step created
    ///
    /// Ids already listed are not repeated. Other operations are returned unchanged.
    pub fn with_created_ids(mut self, created: &[String]) -> Self {
        if let StepOperation::Vector(VectorOp::DeleteChunks { ids })
        | StepOperation::Graph(GraphOp::DeleteNodes { ids }) = &mut self
        {
            for id in created {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }
        self
    }
}

impl From<VectorOp> for StepOperation {
    fn from(op: VectorOp) -> Self {
        StepOperation::Vector(op)
    }
}

impl From<GraphOp> for StepOperation {
    fn from(op: GraphOp) -> Self {
        StepOperation::Graph(op)
    }
}

impl From<MappingOp> for StepOperation {
    fn from(op: MappingOp) -> Self {
        StepOperation::Mapping(op)
    }
}

/// One forward operation plus its optional inverse, as submitted by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionOperation {
    /// Forward operation
    pub operation: StepOperation,
    /// Inverse run if a later step fails
    pub compensating_operation: Option<StepOperation>,
}

impl TransactionOperation {
    /// Operation without compensation
    pub fn new(operation: impl Into<StepOperation>) -> Self {
        Self {
            operation: operation.into(),
            compensating_operation: None,
        }
    }

    /// Attach a compensating operation
    pub fn with_compensation(mut self, compensation: impl Into<StepOperation>) -> Self {
        self.compensating_operation = Some(compensation.into());
        self
    }

    /// Vector bulk store compensated by deleting whatever it created
    pub fn store_vectors(chunks: Vec<Chunk>) -> Self {
        Self::new(VectorOp::StoreChunks { chunks })
            .with_compensation(VectorOp::DeleteChunks { ids: Vec::new() })
    }

    /// Graph bulk store compensated by deleting whatever it created
    pub fn store_nodes(chunks: Vec<Chunk>) -> Self {
        Self::new(GraphOp::StoreChunks { chunks })
            .with_compensation(GraphOp::DeleteNodes { ids: Vec::new() })
    }

    /// Step type of the forward operation
    pub fn step_type(&self) -> StepType {
        self.operation.step_type()
    }

    /// Check that the compensation targets the same store as the forward operation
    pub fn validate(&self) -> TandemResult<()> {
        match &self.compensating_operation {
            Some(comp) if comp.step_type() != self.step_type() => {
                Err(TandemError::UnknownOperationType(format!(
                    "{} compensation on a {} step",
                    comp.kind(),
                    self.step_type()
                )))
            }
            _ => Ok(()),
        }
    }
}

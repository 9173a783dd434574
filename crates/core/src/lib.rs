//! Core types and traits for Tandem
//!
//! This crate defines the foundational types shared by every layer of the
//! cross-store consistency core:
//! - Identifiers: TransactionId, StepId, IssueId, BatchId
//! - EntityMapping: one logical entity's presence in the vector and graph stores
//! - Operations: closed tagged unions dispatched by the transaction coordinator
//! - Transactions: saga steps and lifecycle state
//! - Issues: consistency issues, repair results, reports and statistics
//! - Error: the TandemError taxonomy
//! - Traits: store collaborators (VectorStore, GraphStore) and storage ports
//!   (MappingStore, IssueStore, TransactionLog)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod issue;
pub mod operation;
pub mod payload;
pub mod traits;
pub mod transaction;
pub mod types;

pub use error::{ObjectKind, TandemError, TandemResult};
pub use issue::{
    ConsistencyIssue, ConsistencyReport, ConsistencyStats, DataRepairResult, IssueFilter,
    IssueType, RepairStrategy, Severity,
};
pub use operation::{GraphOp, MappingOp, StepOperation, StepType, TransactionOperation, VectorOp};
pub use payload::{Chunk, StoreOptions, StoreReport};
pub use traits::{GraphStore, IssueStore, MappingStore, TransactionLog, VectorStore};
pub use transaction::{StepOutcome, Transaction, TransactionResult, TransactionStatus, TransactionStep};
pub use types::{
    BatchId, EntityMapping, EntityType, FieldUpdate, IssueId, MappingPatch, StepId, SyncStatus,
    TransactionId,
};

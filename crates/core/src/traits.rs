//! Collaborator and storage port traits
//!
//! Two families of traits live here:
//!
//! - **Store collaborators** ([`VectorStore`], [`GraphStore`]): the external
//!   vector and graph stores. They are async because every call may suspend on
//!   I/O. Timeouts and retries belong to the implementation; the core treats a
//!   returned error as terminal for the step.
//! - **Storage ports** ([`MappingStore`], [`IssueStore`], [`TransactionLog`]):
//!   the tables the core owns. In-memory implementations ship with
//!   `tandem-storage`; a durable backend can be substituted without touching
//!   coordinator or checker logic.
//!
//! Thread safety: all implementations must be `Send + Sync`; they are shared
//! as `Arc<dyn Trait>`.

use async_trait::async_trait;

use crate::error::TandemResult;
use crate::issue::{ConsistencyIssue, DataRepairResult};
use crate::payload::{Chunk, StoreOptions, StoreReport};
use crate::transaction::Transaction;
use crate::types::{EntityMapping, IssueId, TransactionId};

/// Vector store collaborator
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Bulk write
    ///
    /// A report with a non-empty `errors` list is treated by the caller as a
    /// failure of the whole call.
    async fn store_chunks(&self, chunks: &[Chunk], options: &StoreOptions) -> TandemResult<StoreReport>;

    /// Best-effort bulk delete by vector id
    async fn delete_chunks(&self, ids: &[String]) -> TandemResult<()>;

    /// Look up a stored chunk by vector id
    async fn get_chunk(&self, id: &str) -> TandemResult<Option<Chunk>>;
}

/// Graph store collaborator
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Bulk write of chunks as nodes
    ///
    /// A report with a non-empty `errors` list is treated by the caller as a
    /// failure of the whole call.
    async fn store_chunks(&self, chunks: &[Chunk], options: &StoreOptions) -> TandemResult<StoreReport>;

    /// Best-effort bulk delete by node id
    async fn delete_nodes(&self, ids: &[String]) -> TandemResult<()>;

    /// Look up a stored node by graph id
    async fn get_node(&self, id: &str) -> TandemResult<Option<Chunk>>;
}

/// Entity mapping table
///
/// Keyed by entity id with a secondary index by project.
pub trait MappingStore: Send + Sync {
    /// Get a mapping
    fn get(&self, entity_id: &str) -> TandemResult<Option<EntityMapping>>;

    /// Atomic check-and-insert
    ///
    /// # Errors
    ///
    /// `DuplicateEntity` if the entity id is already present.
    fn insert(&self, mapping: EntityMapping) -> TandemResult<()>;

    /// Atomic read-modify-write of one mapping
    ///
    /// The closure sees the current row; the row is replaced only if the
    /// closure returns `Ok`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the entity id is unknown, or whatever the closure returns.
    fn update(
        &self,
        entity_id: &str,
        f: &mut dyn FnMut(&mut EntityMapping) -> TandemResult<()>,
    ) -> TandemResult<EntityMapping>;

    /// Mappings of a project in insertion order (snapshot at call time)
    fn list_by_project(&self, project_id: &str) -> TandemResult<Vec<EntityMapping>>;

    /// Remove a mapping, returning it if it existed
    fn delete(&self, entity_id: &str) -> TandemResult<Option<EntityMapping>>;

    /// Number of mappings in the table
    fn len(&self) -> usize;

    /// Whether the table is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consistency issue table plus append-only repair history
pub trait IssueStore: Send + Sync {
    /// Record a new issue
    fn insert(&self, issue: ConsistencyIssue) -> TandemResult<()>;

    /// Get an issue
    fn get(&self, id: IssueId) -> TandemResult<Option<ConsistencyIssue>>;

    /// Atomic read-modify-write of one issue
    ///
    /// # Errors
    ///
    /// `NotFound` if the issue id is unknown, or whatever the closure returns.
    fn update(
        &self,
        id: IssueId,
        f: &mut dyn FnMut(&mut ConsistencyIssue) -> TandemResult<()>,
    ) -> TandemResult<ConsistencyIssue>;

    /// Issues in detection order, optionally within one project
    fn list(&self, project_id: Option<&str>) -> TandemResult<Vec<ConsistencyIssue>>;

    /// Remove an issue
    fn delete(&self, id: IssueId) -> TandemResult<bool>;

    /// Append a repair outcome
    fn append_repair(&self, result: DataRepairResult) -> TandemResult<()>;

    /// Most recent repair outcomes, oldest first, at most `limit`
    fn repairs(&self, limit: Option<usize>) -> TandemResult<Vec<DataRepairResult>>;
}

/// Append-only log of finished transactions
pub trait TransactionLog: Send + Sync {
    /// Append a transaction in a terminal state
    fn append(&self, txn: Transaction) -> TandemResult<()>;

    /// Look up an archived transaction
    fn get(&self, id: TransactionId) -> TandemResult<Option<Transaction>>;

    /// Most recent transactions, oldest first, at most `limit`
    fn recent(&self, limit: Option<usize>) -> TandemResult<Vec<Transaction>>;

    /// Archived transactions of a project, oldest first
    fn list_by_project(&self, project_id: &str) -> TandemResult<Vec<Transaction>>;

    /// Number of archived transactions
    fn len(&self) -> usize;

    /// Whether nothing has been archived
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

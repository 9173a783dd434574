//! Tandem - cross-store consistency core for dual vector/graph indexing
//!
//! Tandem keeps one logical entity (a file, chunk or graph node) consistent
//! across a vector store and a graph store that share no transaction manager.
//!
//! # Quick Start
//!
//! ```ignore
//! use tandem::{Chunk, EntityType, RepairStrategy, Tandem, TandemConfig};
//!
//! let tandem = Tandem::in_memory(TandemConfig::default())?;
//!
//! // Vector side only; the graph side is written later
//! tandem
//!     .mapping_service()
//!     .create_entity(EntityType::File, "p1", Some(Chunk::new("f1", "fn main() {}")), None)
//!     .await?;
//!
//! let report = tandem.checker().check_project_consistency("p1").await?;
//! tandem.checker().repair_all_issues(Some("p1"), RepairStrategy::Auto).await?;
//! ```
//!
//! # Architecture
//!
//! - `tandem-core`: data model, operations, errors, collaborator traits
//! - `tandem-storage`: entity id manager and in-memory tables
//! - `tandem-concurrency`: saga transaction coordinator
//! - `tandem-engine`: mapping service, checker, monitor, config, wiring

pub use tandem_concurrency::TransactionCoordinator;
pub use tandem_core::*;
pub use tandem_engine::{
    actions, init_tracing, BatchItem, BatchItemResult, BatchReport, ConsistencyChecker,
    ConsistencyConfig, ConsistencyMonitor, EntityCreation, EntityMappingService,
    FingerprintComparator, HistoryConfig, LoggingConfig, PayloadComparator, PendingBatch,
    StoragePorts, SyncResult, Tandem, TandemConfig, CONFIG_FILE_NAME,
};
pub use tandem_storage::{
    EntityIdManager, MemoryIssueStore, MemoryMappingStore, MemoryTransactionLog,
};

/// In-memory store collaborators with failure injection
pub mod testing {
    pub use tandem_storage::testing::*;
}

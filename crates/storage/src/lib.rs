//! Storage layer for Tandem
//!
//! This crate owns the tables of the consistency core:
//! - EntityIdManager: single source of truth for entity → store id mappings
//! - MemoryMappingStore: RwLock-guarded mapping table with a project index
//! - MemoryIssueStore: issue table plus append-only repair history
//! - MemoryTransactionLog: append-only history of finished transactions
//! - ProjectIndex: insertion-ordered secondary index by project
//!
//! The `testing` module provides in-memory vector/graph store collaborators
//! with failure injection and a shared call journal.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entity_ids;
pub mod index;
pub mod issues;
pub mod log;
pub mod mapping;
pub mod testing;

pub use entity_ids::EntityIdManager;
pub use index::ProjectIndex;
pub use issues::MemoryIssueStore;
pub use log::MemoryTransactionLog;
pub use mapping::MemoryMappingStore;

//! Testing utilities for the consistency core
//!
//! This module provides in-memory store collaborators for tests and demos:
//!
//! - **MemoryStore**: a vector or graph store held in a BTreeMap, with
//!   failure injection (failed calls, per-chunk partial failures, failing
//!   deletes and lookups) and raw access for simulating drift
//! - **CallJournal**: ordered record of store calls, shareable between a
//!   vector and a graph store so cross-store ordering can be asserted
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tandem_storage::testing::{CallJournal, MemoryStore};
//!
//! let journal = Arc::new(CallJournal::new());
//! let vectors = MemoryStore::vector().with_journal(Arc::clone(&journal));
//! let graph = MemoryStore::graph().with_journal(Arc::clone(&journal));
//!
//! // Fail the next graph write
//! graph.fail_next_stores(1);
//! ```

mod journal;
mod memory_store;

pub use journal::{CallAction, CallJournal, StoreCall};
pub use memory_store::MemoryStore;

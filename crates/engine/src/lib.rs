//! Service layer for Tandem
//!
//! This crate builds the entity-level services on top of the coordinator:
//! - EntityMappingService: create, update and sync entities across both stores,
//!   plus named batches
//! - ConsistencyChecker: scan a project for drift and repair it
//! - ConsistencyMonitor: periodic sweeps on a tokio task
//! - Tandem: explicit wiring of all services from a `tandem.toml` config
//! - init_tracing: log output setup
//!
//! Sync and repair of one entity are serialized through per-entity locks
//! shared between the mapping service and the checker.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checker;
pub mod comparator;
pub mod config;
pub mod locks;
pub mod logging;
pub mod mapping_service;
pub mod monitor;
pub mod sides;
pub mod tandem;

pub use checker::{actions, ConsistencyChecker};
pub use comparator::{FingerprintComparator, PayloadComparator};
pub use config::{ConsistencyConfig, HistoryConfig, LoggingConfig, TandemConfig, CONFIG_FILE_NAME};
pub use locks::{EntityGuard, EntityLocks};
pub use logging::init_tracing;
pub use mapping_service::{
    BatchItem, BatchItemResult, BatchReport, EntityCreation, EntityMappingService, PendingBatch,
    SyncResult,
};
pub use monitor::ConsistencyMonitor;
pub use sides::Side;
pub use tandem::{StoragePorts, Tandem};

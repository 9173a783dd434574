//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::sync::Arc;

pub use tandem::testing::{CallAction, CallJournal, MemoryStore};
pub use tandem::{
    Chunk, ConsistencyChecker, EntityIdManager, EntityMappingService, EntityType, IssueFilter,
    IssueType, RepairStrategy, StepType, Tandem, TandemConfig, TandemError, TransactionCoordinator,
};

/// A wired core over in-memory stores that share one call journal
pub struct TestEnv {
    pub vector: Arc<MemoryStore>,
    pub graph: Arc<MemoryStore>,
    pub journal: Arc<CallJournal>,
    pub tandem: Tandem,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(TandemConfig::default())
    }

    pub fn with_config(config: TandemConfig) -> Self {
        let journal = Arc::new(CallJournal::new());
        let vector = Arc::new(MemoryStore::vector().with_journal(Arc::clone(&journal)));
        let graph = Arc::new(MemoryStore::graph().with_journal(Arc::clone(&journal)));
        let tandem = Tandem::new(config, vector.clone(), graph.clone()).unwrap();
        Self {
            vector,
            graph,
            journal,
            tandem,
        }
    }

    pub fn ids(&self) -> &EntityIdManager {
        self.tandem.entity_ids()
    }

    pub fn service(&self) -> &EntityMappingService {
        self.tandem.mapping_service()
    }

    pub fn checker(&self) -> &ConsistencyChecker {
        self.tandem.checker()
    }

    pub fn coordinator(&self) -> &TransactionCoordinator {
        self.tandem.coordinator()
    }

    /// Create a file entity in `project` with the chosen sides
    pub async fn create_file(&self, project: &str, id: &str, vector: bool, graph: bool) {
        let chunk = Chunk::new(id, format!("source of {}", id));
        self.service()
            .create_entity(
                EntityType::File,
                project,
                vector.then(|| chunk.clone()),
                graph.then(|| chunk.clone()),
            )
            .await
            .unwrap();
    }
}

/// Chunk with the content used by `TestEnv::create_file`
pub fn file_chunk(id: &str) -> Chunk {
    Chunk::new(id, format!("source of {}", id))
}

//! Explicitly constructed service bundle
//!
//! `Tandem` wires the entity id manager, the transaction coordinator, the
//! mapping service and the consistency checker over one pair of store
//! collaborators and one set of storage ports. There is no global instance:
//! callers construct it and pass it (or its parts) where needed.

use std::sync::Arc;

use tandem_concurrency::TransactionCoordinator;
use tandem_core::{GraphStore, IssueStore, MappingStore, TandemResult, TransactionLog, VectorStore};
use tandem_storage::testing::MemoryStore;
use tandem_storage::{EntityIdManager, MemoryIssueStore, MemoryMappingStore, MemoryTransactionLog};
use tracing::debug;

use crate::checker::ConsistencyChecker;
use crate::config::TandemConfig;
use crate::locks::EntityLocks;
use crate::mapping_service::EntityMappingService;
use crate::monitor::ConsistencyMonitor;

/// Tables the core owns
#[derive(Clone)]
pub struct StoragePorts {
    /// Entity mapping table
    pub mappings: Arc<dyn MappingStore>,
    /// Issue table and repair history
    pub issues: Arc<dyn IssueStore>,
    /// Finished transaction history
    pub transactions: Arc<dyn TransactionLog>,
}

impl StoragePorts {
    /// Fresh in-memory tables
    pub fn in_memory() -> Self {
        Self {
            mappings: Arc::new(MemoryMappingStore::new()),
            issues: Arc::new(MemoryIssueStore::new()),
            transactions: Arc::new(MemoryTransactionLog::new()),
        }
    }
}

impl Default for StoragePorts {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// The consistency core, wired
pub struct Tandem {
    config: TandemConfig,
    ids: Arc<EntityIdManager>,
    coordinator: Arc<TransactionCoordinator>,
    mapping: Arc<EntityMappingService>,
    checker: Arc<ConsistencyChecker>,
}

impl Tandem {
    /// Wire the services over two store collaborators with in-memory tables
    ///
    /// # Errors
    ///
    /// `Config` if the configuration does not validate.
    pub fn new(
        config: TandemConfig,
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
    ) -> TandemResult<Self> {
        Self::with_ports(config, vector, graph, StoragePorts::in_memory())
    }

    /// Wire the services over in-memory stores and tables
    pub fn in_memory(config: TandemConfig) -> TandemResult<Self> {
        Self::new(
            config,
            Arc::new(MemoryStore::vector()),
            Arc::new(MemoryStore::graph()),
        )
    }

    /// Wire the services over two store collaborators and explicit tables
    pub fn with_ports(
        config: TandemConfig,
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        ports: StoragePorts,
    ) -> TandemResult<Self> {
        config.validate()?;

        let ids = Arc::new(EntityIdManager::new(ports.mappings));
        let coordinator = Arc::new(
            TransactionCoordinator::new(vector, graph, Arc::clone(&ids), ports.transactions)
                .with_history_limit(config.history.default_limit),
        );
        let locks = Arc::new(EntityLocks::new());
        let mapping = Arc::new(
            EntityMappingService::new(Arc::clone(&coordinator)).with_locks(Arc::clone(&locks)),
        );
        let checker = Arc::new(
            ConsistencyChecker::new(Arc::clone(&coordinator), ports.issues)
                .with_locks(locks)
                .with_history_limit(config.history.default_limit),
        );
        debug!(?config, "Tandem services wired");

        Ok(Self {
            config,
            ids,
            coordinator,
            mapping,
            checker,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &TandemConfig {
        &self.config
    }

    /// Entity id manager
    pub fn entity_ids(&self) -> &Arc<EntityIdManager> {
        &self.ids
    }

    /// Transaction coordinator
    pub fn coordinator(&self) -> &Arc<TransactionCoordinator> {
        &self.coordinator
    }

    /// Entity mapping service
    pub fn mapping_service(&self) -> &Arc<EntityMappingService> {
        &self.mapping
    }

    /// Consistency checker
    pub fn checker(&self) -> &Arc<ConsistencyChecker> {
        &self.checker
    }

    /// A monitor driven by the `[consistency]` section; call `start()` to run it
    pub fn monitor(&self) -> ConsistencyMonitor {
        ConsistencyMonitor::new(Arc::clone(&self.checker), &self.config.consistency)
    }
}

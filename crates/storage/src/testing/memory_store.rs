//! In-memory vector/graph store collaborator with failure injection

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use tandem_core::{
    Chunk, GraphStore, StepType, StoreOptions, StoreReport, TandemError, TandemResult, VectorStore,
};

use super::journal::{CallAction, CallJournal};

#[derive(Debug, Default)]
struct FailurePlan {
    /// Upcoming store calls that fail outright
    stores_to_fail: usize,
    /// Chunk ids reported as per-item errors
    failing_chunks: HashSet<String>,
    fail_deletes: bool,
    fail_lookups: bool,
}

/// In-memory store acting as either the vector or the graph collaborator
///
/// Objects are keyed `<kind>_<chunk id>`, so a vector write of chunk `f1`
/// reports `vector_f1` and a graph write reports `graph_f1`. Writing the same
/// chunk id again overwrites the object and reports the same id.
#[derive(Debug)]
pub struct MemoryStore {
    kind: StepType,
    objects: RwLock<BTreeMap<String, Chunk>>,
    failures: Mutex<FailurePlan>,
    journal: Arc<CallJournal>,
}

impl MemoryStore {
    fn new(kind: StepType) -> Self {
        Self {
            kind,
            objects: RwLock::new(BTreeMap::new()),
            failures: Mutex::new(FailurePlan::default()),
            journal: Arc::new(CallJournal::new()),
        }
    }

    /// Empty vector store
    pub fn vector() -> Self {
        Self::new(StepType::Vector)
    }

    /// Empty graph store
    pub fn graph() -> Self {
        Self::new(StepType::Graph)
    }

    /// Record calls into a shared journal
    pub fn with_journal(mut self, journal: Arc<CallJournal>) -> Self {
        self.journal = journal;
        self
    }

    /// Journal this store records into
    pub fn journal(&self) -> &Arc<CallJournal> {
        &self.journal
    }

    /// Object id a chunk is stored under
    pub fn object_id(&self, chunk_id: &str) -> String {
        format!("{}_{}", self.kind, chunk_id)
    }

    /// Fail the next `n` store calls outright
    pub fn fail_next_stores(&self, n: usize) {
        self.failures.lock().stores_to_fail = n;
    }

    /// Report a per-item error whenever this chunk id is stored
    pub fn fail_chunk(&self, chunk_id: impl Into<String>) {
        self.failures.lock().failing_chunks.insert(chunk_id.into());
    }

    /// Make delete calls fail
    pub fn fail_deletes(&self, fail: bool) {
        self.failures.lock().fail_deletes = fail;
    }

    /// Make lookups fail
    pub fn fail_lookups(&self, fail: bool) {
        self.failures.lock().fail_lookups = fail;
    }

    /// Drop every injected failure
    pub fn clear_failures(&self) {
        *self.failures.lock() = FailurePlan::default();
    }

    /// Write an object directly, bypassing journal and failures
    pub fn insert_object(&self, object_id: impl Into<String>, chunk: Chunk) {
        self.objects.write().insert(object_id.into(), chunk);
    }

    /// Remove an object directly, bypassing journal and failures
    pub fn remove_object(&self, object_id: &str) -> Option<Chunk> {
        self.objects.write().remove(object_id)
    }

    /// Stored object, if any
    pub fn object(&self, object_id: &str) -> Option<Chunk> {
        self.objects.read().get(object_id).cloned()
    }

    /// Whether an object is stored
    pub fn contains(&self, object_id: &str) -> bool {
        self.objects.read().contains_key(object_id)
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    fn store(&self, chunks: &[Chunk]) -> TandemResult<StoreReport> {
        self.journal.record(
            self.kind,
            CallAction::Store,
            chunks.iter().map(|c| c.id.clone()).collect(),
        );

        let failing = {
            let mut plan = self.failures.lock();
            if plan.stores_to_fail > 0 {
                plan.stores_to_fail -= 1;
                return Err(TandemError::Storage(format!(
                    "injected {} store failure",
                    self.kind
                )));
            }
            plan.failing_chunks.clone()
        };

        let mut created = Vec::with_capacity(chunks.len());
        let mut errors = Vec::new();
        let mut objects = self.objects.write();
        for chunk in chunks {
            if failing.contains(&chunk.id) {
                errors.push(format!("{}: injected item failure", chunk.id));
                continue;
            }
            let object_id = self.object_id(&chunk.id);
            objects.insert(object_id.clone(), chunk.clone());
            created.push(object_id);
        }

        if errors.is_empty() {
            Ok(StoreReport::ok(created))
        } else {
            Ok(StoreReport::failed(created, errors))
        }
    }

    fn delete(&self, ids: &[String]) -> TandemResult<()> {
        self.journal
            .record(self.kind, CallAction::Delete, ids.to_vec());
        if self.failures.lock().fail_deletes {
            return Err(TandemError::Storage(format!(
                "injected {} delete failure",
                self.kind
            )));
        }
        let mut objects = self.objects.write();
        for id in ids {
            objects.remove(id);
        }
        Ok(())
    }

    fn lookup(&self, id: &str) -> TandemResult<Option<Chunk>> {
        if self.failures.lock().fail_lookups {
            return Err(TandemError::Storage(format!(
                "injected {} lookup failure",
                self.kind
            )));
        }
        Ok(self.object(id))
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn store_chunks(&self, chunks: &[Chunk], _options: &StoreOptions) -> TandemResult<StoreReport> {
        self.store(chunks)
    }

    async fn delete_chunks(&self, ids: &[String]) -> TandemResult<()> {
        self.delete(ids)
    }

    async fn get_chunk(&self, id: &str) -> TandemResult<Option<Chunk>> {
        self.lookup(id)
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn store_chunks(&self, chunks: &[Chunk], _options: &StoreOptions) -> TandemResult<StoreReport> {
        self.store(chunks)
    }

    async fn delete_nodes(&self, ids: &[String]) -> TandemResult<()> {
        self.delete(ids)
    }

    async fn get_node(&self, id: &str) -> TandemResult<Option<Chunk>> {
        self.lookup(id)
    }
}

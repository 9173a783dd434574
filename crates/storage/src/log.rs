//! Append-only transaction history

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use tandem_core::{TandemError, TandemResult, Transaction, TransactionId, TransactionLog};

#[derive(Debug, Default)]
struct LogInner {
    entries: Vec<Transaction>,
    by_id: FxHashMap<TransactionId, usize>,
}

/// In-memory append-only log of finished transactions
#[derive(Debug, Default)]
pub struct MemoryTransactionLog {
    inner: RwLock<LogInner>,
}

impl MemoryTransactionLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransactionLog for MemoryTransactionLog {
    fn append(&self, txn: Transaction) -> TandemResult<()> {
        if !txn.status.is_terminal() {
            return Err(TandemError::internal(format!(
                "transaction {} archived in non-terminal state {:?}",
                txn.id, txn.status
            )));
        }
        let mut inner = self.inner.write();
        let position = inner.entries.len();
        inner.by_id.insert(txn.id, position);
        inner.entries.push(txn);
        Ok(())
    }

    fn get(&self, id: TransactionId) -> TandemResult<Option<Transaction>> {
        let inner = self.inner.read();
        Ok(inner.by_id.get(&id).map(|&pos| inner.entries[pos].clone()))
    }

    fn recent(&self, limit: Option<usize>) -> TandemResult<Vec<Transaction>> {
        let inner = self.inner.read();
        let skip = limit.map_or(0, |l| inner.entries.len().saturating_sub(l));
        Ok(inner.entries[skip..].to_vec())
    }

    fn list_by_project(&self, project_id: &str) -> TandemResult<Vec<Transaction>> {
        Ok(self
            .inner
            .read()
            .entries
            .iter()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect())
    }

    fn len(&self) -> usize {
        self.inner.read().entries.len()
    }
}

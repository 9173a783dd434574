//! In-memory issue table and repair history
//!
//! Issues are kept in detection order. Repair history is append-only; reads
//! cap the number of entries returned but nothing is ever evicted.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use tandem_core::{
    ConsistencyIssue, DataRepairResult, IssueId, IssueStore, ObjectKind, TandemError, TandemResult,
};

#[derive(Debug, Default)]
struct IssueTable {
    rows: FxHashMap<IssueId, (u64, ConsistencyIssue)>,
    order: BTreeMap<u64, IssueId>,
    next_seq: u64,
}

/// RwLock-guarded issue table plus repair history
#[derive(Debug, Default)]
pub struct MemoryIssueStore {
    issues: RwLock<IssueTable>,
    repairs: RwLock<Vec<DataRepairResult>>,
}

impl MemoryIssueStore {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }
}

impl IssueStore for MemoryIssueStore {
    fn insert(&self, issue: ConsistencyIssue) -> TandemResult<()> {
        let mut table = self.issues.write();
        if table.rows.contains_key(&issue.id) {
            return Err(TandemError::internal(format!(
                "issue {} recorded twice",
                issue.id
            )));
        }
        let seq = table.next_seq;
        table.next_seq += 1;
        table.order.insert(seq, issue.id);
        table.rows.insert(issue.id, (seq, issue));
        Ok(())
    }

    fn get(&self, id: IssueId) -> TandemResult<Option<ConsistencyIssue>> {
        Ok(self.issues.read().rows.get(&id).map(|(_, i)| i.clone()))
    }

    fn update(
        &self,
        id: IssueId,
        f: &mut dyn FnMut(&mut ConsistencyIssue) -> TandemResult<()>,
    ) -> TandemResult<ConsistencyIssue> {
        let mut table = self.issues.write();
        let (_, row) = table
            .rows
            .get_mut(&id)
            .ok_or_else(|| TandemError::not_found(ObjectKind::Issue, id))?;
        let mut draft = row.clone();
        f(&mut draft)?;
        *row = draft;
        Ok(row.clone())
    }

    fn list(&self, project_id: Option<&str>) -> TandemResult<Vec<ConsistencyIssue>> {
        let table = self.issues.read();
        Ok(table
            .order
            .values()
            .filter_map(|id| table.rows.get(id).map(|(_, issue)| issue))
            .filter(|issue| project_id.map_or(true, |p| issue.project_id == p))
            .cloned()
            .collect())
    }

    fn delete(&self, id: IssueId) -> TandemResult<bool> {
        let mut table = self.issues.write();
        match table.rows.remove(&id) {
            Some((seq, _)) => {
                table.order.remove(&seq);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn append_repair(&self, result: DataRepairResult) -> TandemResult<()> {
        self.repairs.write().push(result);
        Ok(())
    }

    fn repairs(&self, limit: Option<usize>) -> TandemResult<Vec<DataRepairResult>> {
        let repairs = self.repairs.read();
        let skip = limit.map_or(0, |l| repairs.len().saturating_sub(l));
        Ok(repairs[skip..].to_vec())
    }
}

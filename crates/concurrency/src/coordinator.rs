//! Saga transaction coordinator
//!
//! Executes an ordered list of steps across the vector store, the graph store
//! and the mapping table, and on the first failure runs the compensating
//! operation of every executed step in strict reverse order.
//!
//! ## Execution sequence
//!
//! ```text
//! 1. Pending -> Executing, transaction enters the active table
//! 2. Dispatch steps in order; mark each executed with the ids it created
//! 3. IF a step fails:
//!      Executing -> Compensating
//!      compensate executed steps last-to-first (best effort, failures logged)
//!      Compensating -> Failed, error = the triggering failure
//!    ELSE Executing -> Completed
//! 4. Move the transaction from the active table to the history log
//! ```
//!
//! Steps of one transaction never run concurrently. Independent transactions
//! may run concurrently; the active table is a concurrent map and every
//! snapshot taken from it is a clone.
//!
//! ## Session mode
//!
//! One session transaction may be open process-wide. `begin_transaction`
//! opens it, `add_*_operation` appends steps while it is `Pending`, and
//! `commit_transaction` runs it through the sequence above. A second
//! `begin_transaction` while one is open fails with `TransactionInProgress`.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use tandem_core::{
    GraphOp, GraphStore, MappingOp, ObjectKind, StepId, StepOperation, TandemError, TandemResult,
    Transaction, TransactionId, TransactionLog, TransactionOperation, TransactionResult,
    TransactionStatus, VectorOp, VectorStore,
};
use tandem_storage::{EntityIdManager, MemoryTransactionLog};

use crate::dispatch::StepDispatcher;

/// Default number of transactions returned by `get_transaction_history`
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Saga transaction coordinator
pub struct TransactionCoordinator {
    dispatcher: StepDispatcher,
    /// Transactions not yet in a terminal state
    active: DashMap<TransactionId, Transaction>,
    /// The open session transaction, if any
    session: Mutex<Option<TransactionId>>,
    log: Arc<dyn TransactionLog>,
    history_limit: usize,
}

impl TransactionCoordinator {
    /// Create a coordinator over the three collaborators and a history log
    pub fn new(
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        ids: Arc<EntityIdManager>,
        log: Arc<dyn TransactionLog>,
    ) -> Self {
        Self {
            dispatcher: StepDispatcher::new(vector, graph, ids),
            active: DashMap::new(),
            session: Mutex::new(None),
            log,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Create a coordinator with an in-memory history log
    pub fn in_memory(
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        ids: Arc<EntityIdManager>,
    ) -> Self {
        Self::new(vector, graph, ids, Arc::new(MemoryTransactionLog::new()))
    }

    /// Number of transactions `get_transaction_history(None)` returns
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Vector store collaborator
    pub fn vector(&self) -> &Arc<dyn VectorStore> {
        self.dispatcher.vector()
    }

    /// Graph store collaborator
    pub fn graph(&self) -> &Arc<dyn GraphStore> {
        self.dispatcher.graph()
    }

    /// Mapping table steps are dispatched to
    pub fn entity_ids(&self) -> &Arc<EntityIdManager> {
        self.dispatcher.entity_ids()
    }

    // ========================================================================
    // One-shot execution
    // ========================================================================

    /// Build and execute a transaction
    ///
    /// Step failures do not produce `Err`: they are reported through
    /// `TransactionResult { success: false, .. }` after compensation ran.
    ///
    /// # Errors
    ///
    /// `UnknownOperationType` if a compensation targets another store than
    /// its forward operation; nothing is dispatched in that case.
    pub async fn execute_transaction(
        &self,
        project_id: &str,
        operations: Vec<TransactionOperation>,
    ) -> TandemResult<TransactionResult> {
        let mut txn = Transaction::with_operations(project_id, operations)?;
        txn.transition(TransactionStatus::Executing)?;
        self.active.insert(txn.id, txn.clone());
        self.run(txn).await
    }

    // ========================================================================
    // Session mode
    // ========================================================================

    /// Open the session transaction
    ///
    /// # Errors
    ///
    /// `TransactionInProgress` if a session transaction is already open.
    pub fn begin_transaction(&self, project_id: &str) -> TandemResult<TransactionId> {
        let mut session = self.session.lock();
        if let Some(open) = *session {
            return Err(TandemError::TransactionInProgress {
                transaction_id: open,
            });
        }
        let txn = Transaction::new(project_id);
        let id = txn.id;
        self.active.insert(id, txn);
        *session = Some(id);
        debug!(txn_id = %id, project_id, "Session transaction opened");
        Ok(id)
    }

    /// Append a vector step to the session transaction
    pub fn add_vector_operation(
        &self,
        operation: VectorOp,
        compensation: Option<VectorOp>,
    ) -> TandemResult<StepId> {
        self.add_operation(operation.into(), compensation.map(StepOperation::from))
    }

    /// Append a graph step to the session transaction
    pub fn add_graph_operation(
        &self,
        operation: GraphOp,
        compensation: Option<GraphOp>,
    ) -> TandemResult<StepId> {
        self.add_operation(operation.into(), compensation.map(StepOperation::from))
    }

    /// Append a mapping step to the session transaction
    pub fn add_mapping_operation(
        &self,
        operation: MappingOp,
        compensation: Option<MappingOp>,
    ) -> TandemResult<StepId> {
        self.add_operation(operation.into(), compensation.map(StepOperation::from))
    }

    fn add_operation(
        &self,
        operation: StepOperation,
        compensation: Option<StepOperation>,
    ) -> TandemResult<StepId> {
        let id = self.session_id()?;
        let mut entry = self
            .active
            .get_mut(&id)
            .ok_or_else(|| TandemError::not_found(ObjectKind::Transaction, id))?;
        entry.push(TransactionOperation {
            operation,
            compensating_operation: compensation,
        })
    }

    /// Execute the session transaction
    ///
    /// Returns whether every step succeeded. The session slot is released
    /// either way.
    ///
    /// # Errors
    ///
    /// `NoActiveTransaction` if no session transaction is open,
    /// `InvalidInput` if it is already being committed.
    pub async fn commit_transaction(&self) -> TandemResult<bool> {
        let id = self.session_id()?;
        let txn = {
            let mut entry = self
                .active
                .get_mut(&id)
                .ok_or_else(|| TandemError::not_found(ObjectKind::Transaction, id))?;
            if entry.status != TransactionStatus::Pending {
                return Err(TandemError::invalid_input(format!(
                    "transaction {} is already {:?}",
                    id, entry.status
                )));
            }
            entry.transition(TransactionStatus::Executing)?;
            entry.clone()
        };

        let result = self.run(txn).await;
        self.release_session(id);
        Ok(result?.success)
    }

    /// Discard the session transaction
    ///
    /// Executed steps, if any, are compensated in reverse order. The
    /// transaction ends `Failed` with error "rolled back".
    ///
    /// # Errors
    ///
    /// `NoActiveTransaction` if no session transaction is open,
    /// `InvalidInput` while it is being committed.
    pub async fn rollback_transaction(&self) -> TandemResult<()> {
        let id = self.session_id()?;
        let (_, mut txn) = self
            .active
            .remove_if(&id, |_, txn| txn.status == TransactionStatus::Pending)
            .ok_or_else(|| {
                TandemError::invalid_input(format!("transaction {} is being committed", id))
            })?;

        self.compensate(&mut txn).await;
        txn.fail("rolled back")?;
        self.release_session(id);
        info!(txn_id = %id, "Session transaction rolled back");
        self.archive(txn, None);
        Ok(())
    }

    /// Cancel a transaction that has not started executing
    ///
    /// Returns `false` for unknown, executing or finished transactions.
    pub fn cancel_transaction(&self, id: TransactionId) -> TandemResult<bool> {
        let Some((_, mut txn)) = self
            .active
            .remove_if(&id, |_, txn| txn.status == TransactionStatus::Pending)
        else {
            return Ok(false);
        };
        txn.fail("cancelled")?;
        self.release_session(id);
        info!(txn_id = %id, "Transaction cancelled");
        self.archive(txn, None);
        Ok(true)
    }

    /// The open session transaction, if any
    pub fn session_transaction(&self) -> Option<TransactionId> {
        *self.session.lock()
    }

    fn session_id(&self) -> TandemResult<TransactionId> {
        let session = *self.session.lock();
        session.ok_or(TandemError::NoActiveTransaction)
    }

    fn release_session(&self, id: TransactionId) {
        let mut session = self.session.lock();
        if *session == Some(id) {
            *session = None;
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Snapshot of a transaction, active or archived
    pub fn get_transaction(&self, id: TransactionId) -> TandemResult<Option<Transaction>> {
        if let Some(txn) = self.active.get(&id) {
            return Ok(Some(txn.clone()));
        }
        self.log.get(id)
    }

    /// Snapshots of every non-terminal transaction, oldest first
    pub fn get_active_transactions(&self) -> Vec<Transaction> {
        let mut active: Vec<Transaction> = self.active.iter().map(|e| e.value().clone()).collect();
        active.sort_by_key(|txn| txn.created_at);
        active
    }

    /// Most recent finished transactions, oldest first
    ///
    /// `None` uses the configured history limit.
    pub fn get_transaction_history(&self, limit: Option<usize>) -> TandemResult<Vec<Transaction>> {
        self.log.recent(Some(limit.unwrap_or(self.history_limit)))
    }

    /// Finished transactions of one project, oldest first
    pub fn get_project_history(&self, project_id: &str) -> TandemResult<Vec<Transaction>> {
        self.log.list_by_project(project_id)
    }

    // ========================================================================
    // Execution internals
    // ========================================================================

    /// Drive an `Executing` transaction to a terminal state
    ///
    /// On `Err` the transaction is dropped from the active table; it never
    /// reached a state the log accepts.
    async fn run(&self, txn: Transaction) -> TandemResult<TransactionResult> {
        let id = txn.id;
        let outcome = self.drive(txn).await;
        if let Err(e) = &outcome {
            self.active.remove(&id);
            error!(txn_id = %id, error = %e, "Transaction aborted");
        }
        outcome
    }

    async fn drive(&self, mut txn: Transaction) -> TandemResult<TransactionResult> {
        debug!(
            txn_id = %txn.id,
            project_id = %txn.project_id,
            steps = txn.steps.len(),
            "Executing transaction"
        );

        let mut cause = None;
        for index in 0..txn.steps.len() {
            let outcome = self
                .dispatcher
                .dispatch(&txn.project_id, &txn.steps[index].operation, &txn.steps[..index])
                .await;

            let step = &mut txn.steps[index];
            match outcome {
                Ok(created) => {
                    step.executed = true;
                    step.created_ids = created;
                }
                Err(e) => {
                    warn!(
                        txn_id = %txn.id,
                        step = index,
                        store = %step.step_type,
                        error = %e,
                        "Transaction step failed"
                    );
                    step.error = Some(e.to_string());
                    cause = Some(e);
                }
            }
            self.publish(&txn);
            if cause.is_some() {
                break;
            }
        }

        match &cause {
            None => txn.transition(TransactionStatus::Completed)?,
            Some(e) => {
                txn.transition(TransactionStatus::Compensating)?;
                self.publish(&txn);
                self.compensate(&mut txn).await;
                txn.fail(e.to_string())?;
            }
        }

        Ok(self.archive(txn, cause))
    }

    /// Run compensations of executed steps, last to first
    ///
    /// A failed compensation is logged and leaves the step uncompensated; the
    /// remaining compensations still run.
    async fn compensate(&self, txn: &mut Transaction) {
        for index in (0..txn.steps.len()).rev() {
            let step = &txn.steps[index];
            if !step.executed || step.compensated {
                continue;
            }
            let Some(compensation) = step.compensating_operation.clone() else {
                continue;
            };
            let compensation = compensation.with_created_ids(&step.created_ids);

            match self
                .dispatcher
                .dispatch(&txn.project_id, &compensation, &txn.steps[..index])
                .await
            {
                Ok(_) => txn.steps[index].compensated = true,
                Err(e) => {
                    error!(
                        txn_id = %txn.id,
                        step = index,
                        store = %txn.steps[index].step_type,
                        error = %e,
                        "Compensation failed"
                    );
                }
            }
        }
    }

    fn publish(&self, txn: &Transaction) {
        if let Some(mut entry) = self.active.get_mut(&txn.id) {
            *entry = txn.clone();
        }
    }

    /// Move a terminal transaction from the active table to the log
    ///
    /// The log is written before the active entry goes, so the transaction
    /// stays visible to `get_transaction` throughout.
    fn archive(&self, txn: Transaction, cause: Option<TandemError>) -> TransactionResult {
        let mut result = txn.result();
        result.cause = cause;
        if result.success {
            debug!(txn_id = %txn.id, steps = result.executed_steps, "Transaction completed");
        } else {
            info!(
                txn_id = %txn.id,
                error = ?result.error,
                "Transaction failed"
            );
        }

        let id = txn.id;
        if let Err(e) = self.log.append(txn) {
            error!(txn_id = %id, error = %e, "Failed to archive transaction");
        }
        self.active.remove(&id);
        result
    }
}

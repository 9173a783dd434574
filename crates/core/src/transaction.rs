//! Saga transaction types
//!
//! A [`Transaction`] is an ordered list of [`TransactionStep`]s plus lifecycle
//! state. The coordinator owns a transaction while it executes and then moves
//! it to an append-only history log.
//!
//! State transitions:
//! - `Pending` → `Executing` (execution starts)
//! - `Executing` → `Completed` (every step succeeded)
//! - `Executing` → `Compensating` (a step failed)
//! - `Compensating` → `Failed` (compensation finished, best effort)
//! - `Pending` → `Failed` (cancelled or rolled back before execution)
//!
//! Terminal states: `Completed`, `Failed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TandemError, TandemResult};
use crate::operation::{StepOperation, StepType, TransactionOperation};
use crate::types::{StepId, TransactionId};

/// Lifecycle state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Built, steps may still be added
    Pending,
    /// Steps are being dispatched in order
    Executing,
    /// A step failed; executed steps are being compensated in reverse
    Compensating,
    /// Every step succeeded
    Completed,
    /// A step failed (and compensation ran) or the transaction was cancelled
    Failed,
}

impl TransactionStatus {
    /// Whether no further transitions are allowed
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Failed)
    }

    fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Executing)
                | (Pending, Failed)
                | (Executing, Completed)
                | (Executing, Compensating)
                | (Compensating, Failed)
        )
    }
}

/// One unit of work within a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionStep {
    /// Step identifier
    pub id: StepId,
    /// Store the step is dispatched to
    pub step_type: StepType,
    /// Forward operation
    pub operation: StepOperation,
    /// Inverse run on failure of a later step
    pub compensating_operation: Option<StepOperation>,
    /// Set only after the dispatched call completed without error
    pub executed: bool,
    /// Set once the compensating operation completed without error
    pub compensated: bool,
    /// Ids the store reported creating
    pub created_ids: Vec<String>,
    /// Failure message of this step, if it failed
    pub error: Option<String>,
}

impl TransactionStep {
    /// Build a step from a caller-submitted operation
    ///
    /// # Errors
    ///
    /// `UnknownOperationType` if the compensation targets another store.
    pub fn from_operation(op: TransactionOperation) -> TandemResult<Self> {
        op.validate()?;
        Ok(Self {
            id: StepId::new(),
            step_type: op.step_type(),
            operation: op.operation,
            compensating_operation: op.compensating_operation,
            executed: false,
            compensated: false,
            created_ids: Vec::new(),
            error: None,
        })
    }
}

/// An ordered list of steps plus lifecycle state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction identifier
    pub id: TransactionId,
    /// Project every step is scoped to
    pub project_id: String,
    /// Steps in execution order
    pub steps: Vec<TransactionStep>,
    /// Lifecycle state
    pub status: TransactionStatus,
    /// When the transaction was built
    pub created_at: DateTime<Utc>,
    /// When it reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// Triggering failure (never a compensation failure)
    pub error: Option<String>,
}

impl Transaction {
    /// Create an empty pending transaction
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            id: TransactionId::new(),
            project_id: project_id.into(),
            steps: Vec::new(),
            status: TransactionStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    /// Create a pending transaction from a list of operations
    ///
    /// # Errors
    ///
    /// `UnknownOperationType` if any compensation targets another store.
    pub fn with_operations(
        project_id: impl Into<String>,
        operations: Vec<TransactionOperation>,
    ) -> TandemResult<Self> {
        let mut txn = Self::new(project_id);
        for op in operations {
            txn.push(op)?;
        }
        Ok(txn)
    }

    /// Append a step
    ///
    /// # Errors
    ///
    /// `InvalidInput` once execution started, `UnknownOperationType` on a
    /// mismatched compensation.
    pub fn push(&mut self, op: TransactionOperation) -> TandemResult<StepId> {
        if self.status != TransactionStatus::Pending {
            return Err(TandemError::invalid_input(format!(
                "transaction {} is {:?} and no longer accepts operations",
                self.id, self.status
            )));
        }
        let step = TransactionStep::from_operation(op)?;
        let id = step.id;
        self.steps.push(step);
        Ok(id)
    }

    /// Move to another lifecycle state
    ///
    /// # Errors
    ///
    /// `Internal` on a transition the state machine does not allow.
    pub fn transition(&mut self, next: TransactionStatus) -> TandemResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(TandemError::internal(format!(
                "invalid transaction transition {:?} -> {:?} for {}",
                self.status, next, self.id
            )));
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Record the triggering failure and move to `Failed`
    pub fn fail(&mut self, error: impl Into<String>) -> TandemResult<()> {
        self.transition(TransactionStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Number of steps marked executed
    pub fn executed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.executed).count()
    }

    /// Ids created by the first executed step of a given type
    pub fn created_ids_for(&self, step_type: StepType) -> Option<&[String]> {
        self.steps
            .iter()
            .find(|s| s.executed && s.step_type == step_type && !s.created_ids.is_empty())
            .map(|s| s.created_ids.as_slice())
    }

    /// Caller-facing summary
    pub fn result(&self) -> TransactionResult {
        TransactionResult {
            transaction_id: self.id,
            success: self.status == TransactionStatus::Completed,
            executed_steps: self.executed_steps(),
            error: self.error.clone(),
            failed_step: self
                .steps
                .iter()
                .find(|s| s.error.is_some())
                .map(|s| s.step_type),
            steps: self
                .steps
                .iter()
                .map(|s| StepOutcome {
                    step_type: s.step_type,
                    executed: s.executed,
                    compensated: s.compensated,
                    created_ids: s.created_ids.clone(),
                })
                .collect(),
            cause: None,
        }
    }
}

/// Per-step view inside a [`TransactionResult`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Store the step was dispatched to
    pub step_type: StepType,
    /// Forward operation completed
    pub executed: bool,
    /// Compensation completed
    pub compensated: bool,
    /// Ids the store reported creating
    pub created_ids: Vec<String>,
}

/// Outcome of executing a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
    /// Executed transaction
    pub transaction_id: TransactionId,
    /// Terminal state is `Completed`
    pub success: bool,
    /// Number of steps marked executed
    pub executed_steps: usize,
    /// Triggering failure message
    pub error: Option<String>,
    /// Type of the step that failed
    pub failed_step: Option<StepType>,
    /// Per-step outcomes in step order
    pub steps: Vec<StepOutcome>,
    /// Typed triggering failure, when the executor still holds it
    #[serde(skip)]
    pub cause: Option<TandemError>,
}

impl TransactionResult {
    /// First id created by the first executed step of a given type
    pub fn first_created_id(&self, step_type: StepType) -> Option<&str> {
        self.steps
            .iter()
            .filter(|s| s.executed && s.step_type == step_type)
            .flat_map(|s| s.created_ids.iter())
            .map(String::as_str)
            .next()
    }

    /// Turn a failed result into the typed step failure
    ///
    /// The typed cause wins when present, so mapping failures such as
    /// `DuplicateEntity` keep their variant.
    pub fn into_error(self) -> Option<TandemError> {
        if self.success {
            return None;
        }
        if let Some(cause) = self.cause {
            return Some(cause);
        }
        let message = self
            .error
            .unwrap_or_else(|| "transaction failed".to_string());
        Some(match self.failed_step {
            Some(step_type) => TandemError::step_failed(step_type, message),
            None => TandemError::internal(message),
        })
    }
}

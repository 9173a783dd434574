//! Error types for Tandem
//!
//! This module defines the error taxonomy shared by every component of the
//! consistency core. We use `thiserror` for automatic `Display` and `Error`
//! trait implementations.
//!
//! Store collaborators report their own failures as `TandemError` values; the
//! transaction coordinator wraps whatever they return into
//! [`TandemError::StepExecution`] so callers always see the step that failed.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::operation::StepType;
use crate::types::{IssueId, TransactionId};

/// Result type alias for Tandem operations
pub type TandemResult<T> = std::result::Result<T, TandemError>;

/// Kind of object a lookup failed to find
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// An entity mapping
    Mapping,
    /// A consistency issue
    Issue,
    /// A transaction (active or archived)
    Transaction,
    /// A named entity batch
    Batch,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Mapping => "Mapping",
            ObjectKind::Issue => "Issue",
            ObjectKind::Transaction => "Transaction",
            ObjectKind::Batch => "Batch",
        };
        f.write_str(name)
    }
}

/// Error types for the consistency core
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TandemError {
    /// An entity mapping with this id already exists
    #[error("Entity already mapped: {entity_id}")]
    DuplicateEntity {
        /// The conflicting entity id
        entity_id: String,
    },

    /// Mapping, issue, transaction or batch not found
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up
        kind: ObjectKind,
        /// The identifier that was looked up
        id: String,
    },

    /// Repair requested for an issue that already carries a resolution
    #[error("Issue already resolved: {issue_id}")]
    AlreadyResolved {
        /// The resolved issue
        issue_id: IssueId,
    },

    /// Manual repair strategy requested; only automatic repair is implemented
    #[error("Manual repair is not supported (issue {issue_id})")]
    ManualRepairUnsupported {
        /// The issue the repair was requested for
        issue_id: IssueId,
    },

    /// A session transaction is already open
    #[error("Transaction already in progress: {transaction_id}")]
    TransactionInProgress {
        /// The open session transaction
        transaction_id: TransactionId,
    },

    /// A session operation was issued while no session transaction is open
    #[error("No session transaction is open")]
    NoActiveTransaction,

    /// A store (or mapping) step failed during forward execution
    #[error("{step_type} step failed: {message}")]
    StepExecution {
        /// Type of the step that failed
        step_type: StepType,
        /// Collaborator failure description
        message: String,
    },

    /// An operation tag or step type the dispatcher does not understand
    #[error("Unknown operation type: {0}")]
    UnknownOperationType(String),

    /// Caller supplied invalid arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage port failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invariant violation inside the core
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TandemError {
    /// Create a NotFound error
    pub fn not_found(kind: ObjectKind, id: impl fmt::Display) -> Self {
        TandemError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Create an InvalidInput error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        TandemError::InvalidInput(message.into())
    }

    /// Create an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        TandemError::Internal(message.into())
    }

    /// Create a StepExecution error
    pub fn step_failed(step_type: StepType, message: impl Into<String>) -> Self {
        TandemError::StepExecution {
            step_type,
            message: message.into(),
        }
    }

    /// Check whether this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, TandemError::NotFound { .. })
    }
}

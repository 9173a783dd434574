//! Saga transaction coordination for Tandem
//!
//! This crate executes ordered, cross-store operations as one logical unit:
//! - TransactionCoordinator: forward execution in step order, compensation in
//!   strict reverse order on the first failure, active table and history log
//! - Session mode: begin / add / commit / rollback for incremental callers
//!   (one open session transaction process-wide)
//! - StepDispatcher: exhaustive dispatch of vector, graph and mapping steps
//!
//! Atomicity is observational only: compensation is best effort and a
//! compensation failure never replaces the triggering error.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod dispatch;

pub use coordinator::TransactionCoordinator;
pub use dispatch::StepDispatcher;

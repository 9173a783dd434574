//! Transaction Integration Tests
//!
//! Saga execution, the session transaction API and entity batches.

#[path = "../common/mod.rs"]
mod common;

mod batches;
mod saga;
mod session;

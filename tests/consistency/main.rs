//! Consistency Integration Tests
//!
//! Scan and repair flows across the vector store, the graph store and the
//! mapping table, driven through the public `Tandem` bundle.

#[path = "../common/mod.rs"]
mod common;

mod bulk_repair;
mod detection;
mod monitoring;
mod repair;

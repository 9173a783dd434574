//! Store payload types
//!
//! Chunks are the unit both store collaborators accept. The consistency core
//! never looks inside `content` except to fingerprint it for mismatch
//! detection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use xxhash_rust::xxh3::xxh3_64;

/// One unit of indexed content handed to a store collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Caller-chosen identifier; the entity id once the chunk is mapped
    pub id: String,
    /// Raw content (source text, snippet, node body)
    pub content: String,
    /// Free-form metadata (file path, language, line range, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, JsonValue>,
}

impl Chunk {
    /// Create a chunk without metadata
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Copy of this chunk under another id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// xxh3 fingerprint of the content
    pub fn fingerprint(&self) -> u64 {
        xxh3_64(self.content.as_bytes())
    }
}

/// Options passed along with every bulk store call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Project the chunks belong to
    pub project_id: String,
}

impl StoreOptions {
    /// Options for a project
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
        }
    }
}

/// Outcome of a bulk store call
///
/// A non-empty `errors` list is a failure of the whole call even when some
/// items were created.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreReport {
    /// Collaborator-reported overall success
    pub success: bool,
    /// Identifiers created by this call, in input order
    pub created_ids: Vec<String>,
    /// Per-item failures
    pub errors: Vec<String>,
}

impl StoreReport {
    /// Fully successful report
    pub fn ok(created_ids: Vec<String>) -> Self {
        Self {
            success: true,
            created_ids,
            errors: Vec::new(),
        }
    }

    /// Failed report
    pub fn failed(created_ids: Vec<String>, errors: Vec<String>) -> Self {
        Self {
            success: false,
            created_ids,
            errors,
        }
    }

    /// Success with no per-item errors
    pub fn is_clean(&self) -> bool {
        self.success && self.errors.is_empty()
    }
}

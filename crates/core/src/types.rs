//! Identifier and entity mapping types
//!
//! This module defines:
//! - UUID-backed identifiers for transactions, steps, issues and batches
//! - EntityType: the kind of logical entity being indexed
//! - SyncStatus: cross-store synchronization state of a mapping
//! - EntityMapping: one logical entity's identifiers in both stores
//! - MappingPatch / FieldUpdate: explicit partial updates of a mapping

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier using UUID v4
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse an identifier from its string representation
            ///
            /// Returns None if the string is not a valid UUID.
            pub fn from_string(s: &str) -> Option<Self> {
                Uuid::parse_str(s).ok().map(Self)
            }

            /// Get the underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a transaction
    TransactionId
);
uuid_id!(
    /// Unique identifier for a step inside a transaction
    StepId
);
uuid_id!(
    /// Unique identifier for a consistency issue
    IssueId
);
uuid_id!(
    /// Unique identifier for a named entity batch
    BatchId
);

/// Kind of logical entity tracked by a mapping
///
/// Serialized as a plain string so that pipeline-defined kinds round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    /// A whole source file
    File,
    /// A snippet extracted from a file
    Chunk,
    /// A structural graph node (function, class, module, ...)
    Node,
    /// Any other pipeline-defined kind
    Other(String),
}

impl EntityType {
    /// String tag for this entity type
    pub fn as_str(&self) -> &str {
        match self {
            EntityType::File => "file",
            EntityType::Chunk => "chunk",
            EntityType::Node => "node",
            EntityType::Other(tag) => tag,
        }
    }
}

impl From<&str> for EntityType {
    fn from(tag: &str) -> Self {
        match tag {
            "file" => EntityType::File,
            "chunk" => EntityType::Chunk,
            "node" => EntityType::Node,
            other => EntityType::Other(other.to_string()),
        }
    }
}

impl From<String> for EntityType {
    fn from(tag: String) -> Self {
        EntityType::from(tag.as_str())
    }
}

impl From<EntityType> for String {
    fn from(entity_type: EntityType) -> Self {
        entity_type.as_str().to_string()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cross-store synchronization state of a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Both stores confirmed
    Synced,
    /// At least one side not yet written or not yet confirmed
    Pending,
    /// Both sides exist but disagree on content
    Conflict,
}

/// One logical entity's presence across the vector and graph stores
///
/// `entity_id` never changes after creation. `vector_id` and `graph_id` are
/// written once and read mostly, but repair and rollback may clear them
/// through an explicit [`FieldUpdate::Clear`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMapping {
    /// Stable entity identifier, unique within the mapping table
    pub entity_id: String,
    /// Kind of entity
    pub entity_type: EntityType,
    /// Partition key
    pub project_id: String,
    /// Identifier in the vector store, absent until written
    pub vector_id: Option<String>,
    /// Identifier in the graph store, absent until written
    pub graph_id: Option<String>,
    /// When the mapping was created
    pub created_at: DateTime<Utc>,
    /// When the mapping was last modified
    pub updated_at: DateTime<Utc>,
    /// Last successful cross-store confirmation
    pub last_synced: Option<DateTime<Utc>>,
    /// Synchronization state
    pub sync_status: SyncStatus,
}

impl EntityMapping {
    /// Create a mapping
    ///
    /// Status is `Synced` when both identifiers are supplied, `Pending` otherwise.
    pub fn new(
        entity_id: impl Into<String>,
        entity_type: EntityType,
        project_id: impl Into<String>,
        vector_id: Option<String>,
        graph_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let both = vector_id.is_some() && graph_id.is_some();
        Self {
            entity_id: entity_id.into(),
            entity_type,
            project_id: project_id.into(),
            vector_id,
            graph_id,
            created_at: now,
            updated_at: now,
            last_synced: both.then_some(now),
            sync_status: if both {
                SyncStatus::Synced
            } else {
                SyncStatus::Pending
            },
        }
    }

    /// Whether the vector side has been written
    pub fn has_vector(&self) -> bool {
        self.vector_id.is_some()
    }

    /// Whether the graph side has been written
    pub fn has_graph(&self) -> bool {
        self.graph_id.is_some()
    }

    /// Both identifiers present and confirmed
    pub fn is_consistent(&self) -> bool {
        self.has_vector() && self.has_graph() && self.sync_status == SyncStatus::Synced
    }

    /// Apply a patch in place
    ///
    /// Fields the patch leaves as [`FieldUpdate::Keep`] are untouched. When the
    /// patch does not set a status, the status is recomputed: clearing an id
    /// drops the mapping back to `Pending`, completing both ids of a
    /// `Pending` mapping marks it `Synced`.
    pub fn apply(&mut self, patch: &MappingPatch) {
        let cleared = patch.vector_id.is_clear() || patch.graph_id.is_clear();
        patch.vector_id.apply(&mut self.vector_id);
        patch.graph_id.apply(&mut self.graph_id);

        let now = Utc::now();
        match patch.sync_status {
            Some(status) => self.sync_status = status,
            None if cleared => self.sync_status = SyncStatus::Pending,
            None if self.sync_status == SyncStatus::Pending
                && self.has_vector()
                && self.has_graph() =>
            {
                self.sync_status = SyncStatus::Synced
            }
            None => {}
        }
        if self.sync_status == SyncStatus::Synced {
            self.last_synced = Some(now);
        }
        self.updated_at = now;
    }
}

/// Update instruction for one optional mapping field
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op", content = "value")]
pub enum FieldUpdate<T> {
    /// Leave the field as it is
    #[default]
    Keep,
    /// Overwrite the field
    Set(T),
    /// Explicitly clear the field
    Clear,
}

impl<T: Clone> FieldUpdate<T> {
    /// Apply the update to a field
    pub fn apply(&self, field: &mut Option<T>) {
        match self {
            FieldUpdate::Keep => {}
            FieldUpdate::Set(value) => *field = Some(value.clone()),
            FieldUpdate::Clear => *field = None,
        }
    }

    /// Whether this update clears the field
    pub fn is_clear(&self) -> bool {
        matches!(self, FieldUpdate::Clear)
    }

    /// Whether this update leaves the field untouched
    pub fn is_keep(&self) -> bool {
        matches!(self, FieldUpdate::Keep)
    }
}

/// Partial update of an entity mapping
///
/// Supplying only one side never drops the other: every field defaults to
/// [`FieldUpdate::Keep`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MappingPatch {
    /// Vector store identifier update
    #[serde(default)]
    pub vector_id: FieldUpdate<String>,
    /// Graph store identifier update
    #[serde(default)]
    pub graph_id: FieldUpdate<String>,
    /// Explicit status; recomputed when None
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_status: Option<SyncStatus>,
}

impl MappingPatch {
    /// Empty patch (keeps everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the vector identifier
    pub fn vector_id(mut self, id: impl Into<String>) -> Self {
        self.vector_id = FieldUpdate::Set(id.into());
        self
    }

    /// Set the graph identifier
    pub fn graph_id(mut self, id: impl Into<String>) -> Self {
        self.graph_id = FieldUpdate::Set(id.into());
        self
    }

    /// Clear the vector identifier
    pub fn clear_vector_id(mut self) -> Self {
        self.vector_id = FieldUpdate::Clear;
        self
    }

    /// Clear the graph identifier
    pub fn clear_graph_id(mut self) -> Self {
        self.graph_id = FieldUpdate::Clear;
        self
    }

    /// Force a sync status
    pub fn sync_status(mut self, status: SyncStatus) -> Self {
        self.sync_status = Some(status);
        self
    }

    /// Whether applying this patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.vector_id.is_keep() && self.graph_id.is_keep() && self.sync_status.is_none()
    }
}

//! Consistency issue and repair types

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EntityMapping, EntityType, IssueId};

/// Kind of divergence between the two stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    /// Mapping has no vector id
    MissingVector,
    /// Mapping has no graph id
    MissingGraph,
    /// Both sides exist but their content disagrees
    DataMismatch,
    /// Mapping references an object a store does not hold
    OrphanedEntity,
}

impl IssueType {
    /// String tag for this issue type
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::MissingVector => "missing_vector",
            IssueType::MissingGraph => "missing_graph",
            IssueType::DataMismatch => "data_mismatch",
            IssueType::OrphanedEntity => "orphaned_entity",
        }
    }

    /// Severity assigned at detection
    pub fn default_severity(&self) -> Severity {
        match self {
            IssueType::MissingVector | IssueType::MissingGraph => Severity::Medium,
            IssueType::DataMismatch | IssueType::OrphanedEntity => Severity::High,
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Cosmetic
    Low,
    /// One side missing
    Medium,
    /// Stores disagree
    High,
    /// Data loss likely
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// A detected anomaly
///
/// Created by a scan, mutated only by repair, deleted only by an explicit
/// purge of resolved issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyIssue {
    /// Issue identifier
    pub id: IssueId,
    /// Kind of divergence
    pub issue_type: IssueType,
    /// Affected entity
    pub entity_id: String,
    /// Kind of the affected entity
    pub entity_type: EntityType,
    /// Owning project
    pub project_id: String,
    /// Severity at detection
    pub severity: Severity,
    /// Human-readable description
    pub description: String,
    /// When the scan flagged it
    pub detected_at: DateTime<Utc>,
    /// When a repair resolved it
    pub resolved_at: Option<DateTime<Utc>>,
    /// What the repair did
    pub resolution: Option<String>,
}

impl ConsistencyIssue {
    /// New unresolved issue for a mapping
    pub fn detect(
        issue_type: IssueType,
        mapping: &EntityMapping,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: IssueId::new(),
            issue_type,
            entity_id: mapping.entity_id.clone(),
            entity_type: mapping.entity_type.clone(),
            project_id: mapping.project_id.clone(),
            severity: issue_type.default_severity(),
            description: description.into(),
            detected_at: Utc::now(),
            resolved_at: None,
            resolution: None,
        }
    }

    /// Whether a repair has resolved this issue
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    /// Mark resolved
    pub fn resolve(&mut self, resolution: impl Into<String>) {
        self.resolved_at = Some(Utc::now());
        self.resolution = Some(resolution.into());
    }
}

/// Repair strategy requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStrategy {
    /// Repair automatically by issue type
    #[default]
    Auto,
    /// Operator-driven repair; not implemented
    Manual,
}

/// Outcome of one repair attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRepairResult {
    /// Issue the repair targeted
    pub issue_id: IssueId,
    /// Whether the repair succeeded
    pub success: bool,
    /// Tag describing what was done (or attempted)
    pub action: String,
    /// Detail
    pub message: String,
    /// When the attempt finished
    pub timestamp: DateTime<Utc>,
}

impl DataRepairResult {
    /// Successful repair
    pub fn succeeded(issue_id: IssueId, action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            issue_id,
            success: true,
            action: action.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Failed repair
    pub fn failed(issue_id: IssueId, action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            issue_id,
            success: false,
            action: action.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Filter for issue queries; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueFilter {
    /// Only this project
    pub project_id: Option<String>,
    /// Only this issue type
    pub issue_type: Option<IssueType>,
    /// Only this severity
    pub severity: Option<Severity>,
    /// Only resolved (true) or unresolved (false) issues
    pub resolved: Option<bool>,
    /// Only issues for this entity
    pub entity_id: Option<String>,
}

impl IssueFilter {
    /// Filter matching every issue
    pub fn all() -> Self {
        Self::default()
    }

    /// Unresolved issues, optionally within one project
    pub fn unresolved(project_id: Option<&str>) -> Self {
        Self {
            project_id: project_id.map(str::to_string),
            resolved: Some(false),
            ..Self::default()
        }
    }

    /// Restrict to a project
    pub fn project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Restrict to an issue type
    pub fn issue_type(mut self, issue_type: IssueType) -> Self {
        self.issue_type = Some(issue_type);
        self
    }

    /// Restrict to an entity
    pub fn entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Whether an issue passes this filter
    pub fn matches(&self, issue: &ConsistencyIssue) -> bool {
        self.project_id.as_deref().map_or(true, |p| issue.project_id == p)
            && self.issue_type.map_or(true, |t| issue.issue_type == t)
            && self.severity.map_or(true, |s| issue.severity == s)
            && self.resolved.map_or(true, |r| issue.is_resolved() == r)
            && self.entity_id.as_deref().map_or(true, |e| issue.entity_id == e)
    }
}

/// Outcome of scanning one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    /// Scanned project
    pub project_id: String,
    /// Mappings scanned
    pub total_entities: usize,
    /// Issues recorded by this scan
    pub issues_found: usize,
    /// The recorded issues, in scan order
    pub issues: Vec<ConsistencyIssue>,
    /// When the scan started
    pub checked_at: DateTime<Utc>,
    /// How long the scan took
    pub duration: Duration,
}

/// Aggregate view of the issue table, computed at call time
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConsistencyStats {
    /// Issues in scope
    pub total_issues: usize,
    /// Issues with a resolution
    pub resolved: usize,
    /// Issues without a resolution
    pub unresolved: usize,
    /// Count per issue type
    pub by_type: BTreeMap<IssueType, usize>,
    /// Count per severity
    pub by_severity: BTreeMap<Severity, usize>,
    /// resolved / total, 0.0 for an empty table
    pub resolution_rate: f64,
    /// Repair attempts recorded in history
    pub repairs_attempted: usize,
    /// Successful repair attempts recorded in history
    pub repairs_succeeded: usize,
}

impl ConsistencyStats {
    /// Aggregate a set of issues
    pub fn from_issues<'a>(issues: impl IntoIterator<Item = &'a ConsistencyIssue>) -> Self {
        let mut stats = Self::default();
        for issue in issues {
            stats.total_issues += 1;
            if issue.is_resolved() {
                stats.resolved += 1;
            } else {
                stats.unresolved += 1;
            }
            *stats.by_type.entry(issue.issue_type).or_default() += 1;
            *stats.by_severity.entry(issue.severity).or_default() += 1;
        }
        if stats.total_issues > 0 {
            stats.resolution_rate = stats.resolved as f64 / stats.total_issues as f64;
        }
        stats
    }
}

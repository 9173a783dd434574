//! Consistency checking and repair
//!
//! A scan walks a snapshot of one project's mappings and classifies each:
//!
//! | Condition                                  | Issue             | Severity |
//! |--------------------------------------------|-------------------|----------|
//! | no vector id                               | `missing_vector`  | medium   |
//! | no graph id                                | `missing_graph`   | medium   |
//! | both ids, a referenced object is gone      | `orphaned_entity` | high     |
//! | both ids, objects exist, content disagrees | `data_mismatch`   | high     |
//!
//! A mapping with both objects present and agreeing is confirmed as synced.
//! Scans do not deduplicate: every scan records the issues it finds.
//!
//! Repairs run through the transaction coordinator and are serialized per
//! entity. Every attempt, successful or not, lands in the repair history.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use tandem_concurrency::TransactionCoordinator;
use tandem_core::{
    ConsistencyIssue, ConsistencyReport, ConsistencyStats, DataRepairResult, EntityMapping,
    GraphOp, IssueFilter, IssueId, IssueStore, IssueType, MappingOp, ObjectKind, RepairStrategy,
    SyncStatus, TandemError, TandemResult, TransactionOperation, VectorOp,
};
use tandem_storage::{EntityIdManager, MemoryIssueStore};

use crate::comparator::{FingerprintComparator, PayloadComparator};
use crate::locks::EntityLocks;
use crate::sides::{self, Side};

/// Default number of entries `get_repair_history(None)` returns
pub const DEFAULT_REPAIR_HISTORY_LIMIT: usize = 100;

/// Repair actions recorded in results and resolutions
pub mod actions {
    /// Vector side written from the graph side
    pub const CREATED_VECTOR_DATA: &str = "created_vector_data";
    /// Graph side written from the vector side
    pub const CREATED_GRAPH_DATA: &str = "created_graph_data";
    /// Graph side rewritten from the canonical vector side
    pub const REWROTE_GRAPH_DATA: &str = "rewrote_graph_data";
    /// Surviving objects and the mapping removed
    pub const REMOVED_ORPHANED_MAPPING: &str = "removed_orphaned_mapping";
    /// The condition no longer holds
    pub const NO_ACTION_REQUIRED: &str = "no_action_required";
    /// The repair request itself was refused
    pub const REPAIR_REJECTED: &str = "repair_rejected";
}

/// What one mapping looked like during a scan
enum Finding {
    Issues(Vec<ConsistencyIssue>),
    Mismatch(ConsistencyIssue),
    Clean,
    Unreadable,
}

/// Detects and repairs divergence between the vector and graph stores
pub struct ConsistencyChecker {
    coordinator: Arc<TransactionCoordinator>,
    issues: Arc<dyn IssueStore>,
    comparator: Arc<dyn PayloadComparator>,
    locks: Arc<EntityLocks>,
    history_limit: usize,
}

impl ConsistencyChecker {
    /// Create a checker over a coordinator and an issue table
    pub fn new(coordinator: Arc<TransactionCoordinator>, issues: Arc<dyn IssueStore>) -> Self {
        Self {
            coordinator,
            issues,
            comparator: Arc::new(FingerprintComparator),
            locks: Arc::new(EntityLocks::new()),
            history_limit: DEFAULT_REPAIR_HISTORY_LIMIT,
        }
    }

    /// Create a checker with an in-memory issue table
    pub fn in_memory(coordinator: Arc<TransactionCoordinator>) -> Self {
        Self::new(coordinator, Arc::new(MemoryIssueStore::new()))
    }

    /// Replace the content comparator
    pub fn with_comparator(mut self, comparator: Arc<dyn PayloadComparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Share per-entity locks with other services
    pub fn with_locks(mut self, locks: Arc<EntityLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Number of entries `get_repair_history(None)` returns
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    fn ids(&self) -> &EntityIdManager {
        self.coordinator.entity_ids()
    }

    // ========================================================================
    // Scanning
    // ========================================================================

    /// Scan every mapping of a project and record the issues found
    pub async fn check_project_consistency(&self, project_id: &str) -> TandemResult<ConsistencyReport> {
        let started = Instant::now();
        let checked_at = Utc::now();
        let mappings = self.ids().get_mappings_by_project(project_id)?;

        let mut found = Vec::new();
        for mapping in &mappings {
            let issues = match self.inspect(mapping).await {
                Finding::Issues(issues) => issues,
                Finding::Mismatch(issue) => {
                    if let Err(e) = self.ids().mark_conflict(&mapping.entity_id) {
                        warn!(entity_id = %mapping.entity_id, error = %e, "Could not flag conflict");
                    }
                    vec![issue]
                }
                Finding::Clean => {
                    if mapping.sync_status != SyncStatus::Synced {
                        if let Err(e) = self.ids().mark_synced(&mapping.entity_id) {
                            debug!(entity_id = %mapping.entity_id, error = %e, "Could not confirm mapping");
                        }
                    }
                    Vec::new()
                }
                Finding::Unreadable => Vec::new(),
            };
            for issue in issues {
                self.issues.insert(issue.clone())?;
                found.push(issue);
            }
        }

        let report = ConsistencyReport {
            project_id: project_id.to_string(),
            total_entities: mappings.len(),
            issues_found: found.len(),
            issues: found,
            checked_at,
            duration: started.elapsed(),
        };
        info!(
            project_id,
            entities = report.total_entities,
            issues = report.issues_found,
            duration_ms = report.duration.as_millis() as u64,
            "Consistency check finished"
        );
        Ok(report)
    }

    async fn inspect(&self, mapping: &EntityMapping) -> Finding {
        let (vector_id, graph_id) = match (&mapping.vector_id, &mapping.graph_id) {
            (Some(v), Some(g)) => (v, g),
            _ => {
                let mut issues = Vec::new();
                if !mapping.has_vector() {
                    issues.push(ConsistencyIssue::detect(
                        IssueType::MissingVector,
                        mapping,
                        format!("Entity {} has no vector representation", mapping.entity_id),
                    ));
                }
                if !mapping.has_graph() {
                    issues.push(ConsistencyIssue::detect(
                        IssueType::MissingGraph,
                        mapping,
                        format!("Entity {} has no graph representation", mapping.entity_id),
                    ));
                }
                return Finding::Issues(issues);
            }
        };

        let vector = Side::Vector.fetch(&self.coordinator, vector_id).await;
        let graph = Side::Graph.fetch(&self.coordinator, graph_id).await;
        let (vector, graph) = match (vector, graph) {
            (Ok(v), Ok(g)) => (v, g),
            (Err(e), _) | (_, Err(e)) => {
                // A lookup failure says nothing about the entity; check it next scan
                warn!(entity_id = %mapping.entity_id, error = %e, "Store lookup failed, skipping entity");
                return Finding::Unreadable;
            }
        };

        match (vector, graph) {
            (Some(v), Some(g)) => {
                if self.comparator.matches(&v, &g) {
                    Finding::Clean
                } else {
                    Finding::Mismatch(ConsistencyIssue::detect(
                        IssueType::DataMismatch,
                        mapping,
                        format!(
                            "Vector {} and graph {} of entity {} disagree",
                            vector_id, graph_id, mapping.entity_id
                        ),
                    ))
                }
            }
            (v, g) => {
                let mut gone = Vec::new();
                if v.is_none() {
                    gone.push(format!("vector {}", vector_id));
                }
                if g.is_none() {
                    gone.push(format!("graph {}", graph_id));
                }
                Finding::Issues(vec![ConsistencyIssue::detect(
                    IssueType::OrphanedEntity,
                    mapping,
                    format!(
                        "Entity {} references missing {}",
                        mapping.entity_id,
                        gone.join(" and ")
                    ),
                )])
            }
        }
    }

    // ========================================================================
    // Repair
    // ========================================================================

    /// Repair one issue
    ///
    /// Repair failures are reported through an unsuccessful result (and
    /// recorded in history); the issue stays unresolved.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown issue
    /// - `AlreadyResolved` for an issue that carries a resolution
    /// - `ManualRepairUnsupported` for the manual strategy
    pub async fn repair_issue(
        &self,
        issue_id: IssueId,
        strategy: RepairStrategy,
    ) -> TandemResult<DataRepairResult> {
        let issue = self.require_issue(issue_id)?;
        if issue.is_resolved() {
            return Err(TandemError::AlreadyResolved { issue_id });
        }
        if strategy == RepairStrategy::Manual {
            return Err(TandemError::ManualRepairUnsupported { issue_id });
        }

        let _guard = self.locks.lock(&issue.entity_id).await;
        // Another repair may have resolved it while we waited
        let issue = self.require_issue(issue_id)?;
        if issue.is_resolved() {
            return Err(TandemError::AlreadyResolved { issue_id });
        }

        let result = match self.apply_repair(&issue).await {
            Ok((action, message)) => {
                self.issues.update(issue_id, &mut |stored| {
                    stored.resolve(action);
                    Ok(())
                })?;
                info!(
                    issue_id = %issue_id,
                    entity_id = %issue.entity_id,
                    action,
                    "Issue repaired"
                );
                DataRepairResult::succeeded(issue_id, action, message)
            }
            Err(e) => {
                warn!(
                    issue_id = %issue_id,
                    entity_id = %issue.entity_id,
                    issue_type = %issue.issue_type,
                    error = %e,
                    "Repair failed"
                );
                DataRepairResult::failed(issue_id, attempted_action(issue.issue_type), e.to_string())
            }
        };

        self.issues.append_repair(result.clone())?;
        Ok(result)
    }

    /// Repair every unresolved issue, optionally within one project
    ///
    /// One result per issue, in detection order. Refused requests become
    /// unsuccessful results with action `repair_rejected`.
    pub async fn repair_all_issues(
        &self,
        project_id: Option<&str>,
        strategy: RepairStrategy,
    ) -> TandemResult<Vec<DataRepairResult>> {
        let pending: Vec<IssueId> = self
            .issues
            .list(project_id)?
            .into_iter()
            .filter(|issue| !issue.is_resolved())
            .map(|issue| issue.id)
            .collect();

        let mut results = Vec::with_capacity(pending.len());
        for issue_id in pending {
            let result = match self.repair_issue(issue_id, strategy).await {
                Ok(result) => result,
                Err(e) => DataRepairResult::failed(issue_id, actions::REPAIR_REJECTED, e.to_string()),
            };
            results.push(result);
        }

        info!(
            project_id = project_id.unwrap_or("*"),
            attempted = results.len(),
            succeeded = results.iter().filter(|r| r.success).count(),
            "Bulk repair finished"
        );
        Ok(results)
    }

    async fn apply_repair(&self, issue: &ConsistencyIssue) -> TandemResult<(&'static str, String)> {
        let Some(mapping) = self.ids().get_mapping(&issue.entity_id)? else {
            return Ok((
                actions::NO_ACTION_REQUIRED,
                format!("Mapping {} no longer exists", issue.entity_id),
            ));
        };

        match issue.issue_type {
            IssueType::MissingVector => self.create_side(&mapping, Side::Vector).await,
            IssueType::MissingGraph => self.create_side(&mapping, Side::Graph).await,
            IssueType::DataMismatch => self.rewrite_graph(&mapping).await,
            IssueType::OrphanedEntity => self.remove_orphan(&mapping).await,
        }
    }

    async fn create_side(
        &self,
        mapping: &EntityMapping,
        side: Side,
    ) -> TandemResult<(&'static str, String)> {
        if side.id_of(mapping).is_some() {
            return Ok((
                actions::NO_ACTION_REQUIRED,
                format!("{:?} side of {} already present", side, mapping.entity_id),
            ));
        }

        let payload = sides::recover_payload(&self.coordinator, mapping, side).await;
        let updated = sides::write_sides(&self.coordinator, mapping, vec![(side, payload)]).await?;
        let (action, id) = match side {
            Side::Vector => (actions::CREATED_VECTOR_DATA, updated.vector_id),
            Side::Graph => (actions::CREATED_GRAPH_DATA, updated.graph_id),
        };
        Ok((
            action,
            format!(
                "Stored {} for entity {}",
                id.unwrap_or_default(),
                mapping.entity_id
            ),
        ))
    }

    async fn rewrite_graph(&self, mapping: &EntityMapping) -> TandemResult<(&'static str, String)> {
        let (Some(vector_id), Some(_)) = (&mapping.vector_id, &mapping.graph_id) else {
            return Err(TandemError::invalid_input(format!(
                "entity {} lost a side since the scan; rescan before repairing",
                mapping.entity_id
            )));
        };
        let Some(canonical) = Side::Vector.fetch(&self.coordinator, vector_id).await? else {
            return Err(TandemError::invalid_input(format!(
                "vector {} of entity {} no longer exists; rescan before repairing",
                vector_id, mapping.entity_id
            )));
        };

        let updated =
            sides::write_sides(&self.coordinator, mapping, vec![(Side::Graph, canonical)]).await?;
        self.ids().mark_synced(&updated.entity_id)?;
        Ok((
            actions::REWROTE_GRAPH_DATA,
            format!(
                "Rewrote graph {} from vector {}",
                updated.graph_id.unwrap_or_default(),
                vector_id
            ),
        ))
    }

    async fn remove_orphan(&self, mapping: &EntityMapping) -> TandemResult<(&'static str, String)> {
        let mut operations = Vec::with_capacity(3);
        let mut removed = Vec::new();

        if let Some(id) = &mapping.vector_id {
            if self.survives(Side::Vector, id).await {
                operations.push(TransactionOperation::new(VectorOp::DeleteChunks {
                    ids: vec![id.clone()],
                }));
                removed.push(id.clone());
            }
        }
        if let Some(id) = &mapping.graph_id {
            if self.survives(Side::Graph, id).await {
                operations.push(TransactionOperation::new(GraphOp::DeleteNodes {
                    ids: vec![id.clone()],
                }));
                removed.push(id.clone());
            }
        }
        operations.push(TransactionOperation::new(MappingOp::Delete {
            entity_id: mapping.entity_id.clone(),
        }));

        let result = self
            .coordinator
            .execute_transaction(&mapping.project_id, operations)
            .await?;
        if let Some(err) = result.into_error() {
            return Err(err);
        }

        let message = if removed.is_empty() {
            format!("Removed mapping {}", mapping.entity_id)
        } else {
            format!(
                "Removed mapping {} and surviving objects {}",
                mapping.entity_id,
                removed.join(", ")
            )
        };
        Ok((actions::REMOVED_ORPHANED_MAPPING, message))
    }

    /// Whether an object may still exist (lookup failures count as yes)
    async fn survives(&self, side: Side, id: &str) -> bool {
        !matches!(side.fetch(&self.coordinator, id).await, Ok(None))
    }

    fn require_issue(&self, issue_id: IssueId) -> TandemResult<ConsistencyIssue> {
        self.issues
            .get(issue_id)?
            .ok_or_else(|| TandemError::not_found(ObjectKind::Issue, issue_id))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Issues matching a filter, in detection order
    pub fn get_issues(&self, filter: &IssueFilter) -> TandemResult<Vec<ConsistencyIssue>> {
        Ok(self
            .issues
            .list(filter.project_id.as_deref())?
            .into_iter()
            .filter(|issue| filter.matches(issue))
            .collect())
    }

    /// Aggregate statistics, computed at call time
    ///
    /// Repair counts cover attempts on the issues in scope.
    pub fn get_consistency_stats(&self, project_id: Option<&str>) -> TandemResult<ConsistencyStats> {
        let issues = self.issues.list(project_id)?;
        let mut stats = ConsistencyStats::from_issues(&issues);

        let in_scope: HashSet<IssueId> = issues.iter().map(|issue| issue.id).collect();
        for repair in self.issues.repairs(None)? {
            if project_id.is_none() || in_scope.contains(&repair.issue_id) {
                stats.repairs_attempted += 1;
                if repair.success {
                    stats.repairs_succeeded += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Delete resolved issues, optionally within one project; returns how many
    pub fn clear_resolved_issues(&self, project_id: Option<&str>) -> TandemResult<usize> {
        let mut cleared = 0;
        for issue in self.issues.list(project_id)? {
            if issue.is_resolved() && self.issues.delete(issue.id)? {
                cleared += 1;
            }
        }
        debug!(project_id = project_id.unwrap_or("*"), cleared, "Resolved issues cleared");
        Ok(cleared)
    }

    /// Most recent repair attempts, oldest first
    ///
    /// `None` uses the configured history limit.
    pub fn get_repair_history(&self, limit: Option<usize>) -> TandemResult<Vec<DataRepairResult>> {
        self.issues.repairs(Some(limit.unwrap_or(self.history_limit)))
    }
}

fn attempted_action(issue_type: IssueType) -> &'static str {
    match issue_type {
        IssueType::MissingVector => actions::CREATED_VECTOR_DATA,
        IssueType::MissingGraph => actions::CREATED_GRAPH_DATA,
        IssueType::DataMismatch => actions::REWROTE_GRAPH_DATA,
        IssueType::OrphanedEntity => actions::REMOVED_ORPHANED_MAPPING,
    }
}

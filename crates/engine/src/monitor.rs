//! Periodic consistency sweeps
//!
//! ConsistencyMonitor runs as a tokio task and, every `check_interval`,
//! scans each watched project and optionally repairs what it found.
//!
//! # Design Notes
//!
//! - Sleeps first; the first sweep happens one interval after `start()`
//! - Errors are logged and never end the loop
//! - Graceful shutdown via a watch channel; dropping the monitor also stops
//!   the task

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use tandem_core::{ConsistencyReport, RepairStrategy};

use crate::checker::ConsistencyChecker;
use crate::config::ConsistencyConfig;

/// Background consistency sweeps
///
/// # Example
///
/// ```ignore
/// let monitor = tandem.monitor();
/// monitor.watch_project("p1");
/// let handle = monitor.start();
///
/// // ... index ...
///
/// monitor.shutdown();
/// handle.await?;
/// ```
pub struct ConsistencyMonitor {
    checker: Arc<ConsistencyChecker>,
    projects: Arc<RwLock<BTreeSet<String>>>,
    check_interval: Duration,
    auto_repair: bool,
    shutdown: watch::Sender<bool>,
}

impl ConsistencyMonitor {
    /// Create a monitor from the `[consistency]` config section
    pub fn new(checker: Arc<ConsistencyChecker>, config: &ConsistencyConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            checker,
            projects: Arc::new(RwLock::new(BTreeSet::new())),
            check_interval: config.check_interval(),
            auto_repair: config.auto_repair,
            shutdown,
        }
    }

    /// Override the sweep interval
    pub fn with_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    /// Include a project in sweeps; returns whether it was newly added
    pub fn watch_project(&self, project_id: &str) -> bool {
        self.projects.write().insert(project_id.to_string())
    }

    /// Exclude a project from sweeps; returns whether it was watched
    pub fn unwatch_project(&self, project_id: &str) -> bool {
        self.projects.write().remove(project_id)
    }

    /// Watched projects in name order
    pub fn watched_projects(&self) -> Vec<String> {
        self.projects.read().iter().cloned().collect()
    }

    /// Spawn the sweep loop on the current tokio runtime
    ///
    /// The task runs until `shutdown()` is called or the monitor is dropped.
    pub fn start(&self) -> JoinHandle<()> {
        let checker = Arc::clone(&self.checker);
        let projects = Arc::clone(&self.projects);
        let check_interval = self.check_interval;
        let auto_repair = self.auto_repair;
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            info!(interval_secs = check_interval.as_secs(), auto_repair, "Consistency monitor started");
            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(check_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                }
                let watched: Vec<String> = projects.read().iter().cloned().collect();
                sweep(&checker, &watched, auto_repair).await;
            }
            info!("Consistency monitor stopped");
        })
    }

    /// Run one sweep now and return the reports
    pub async fn run_once(&self) -> Vec<ConsistencyReport> {
        let watched = self.watched_projects();
        sweep(&self.checker, &watched, self.auto_repair).await
    }

    /// Signal shutdown
    ///
    /// The task exits at its next wake-up; an in-flight sweep finishes first.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Check if shutdown has been signaled
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }
}

async fn sweep(
    checker: &ConsistencyChecker,
    projects: &[String],
    auto_repair: bool,
) -> Vec<ConsistencyReport> {
    let mut reports = Vec::with_capacity(projects.len());
    for project_id in projects {
        let report = match checker.check_project_consistency(project_id).await {
            Ok(report) => report,
            Err(e) => {
                error!(project_id = %project_id, error = %e, "Consistency sweep failed");
                continue;
            }
        };

        if auto_repair && report.issues_found > 0 {
            match checker
                .repair_all_issues(Some(project_id), RepairStrategy::Auto)
                .await
            {
                Ok(results) => debug!(
                    project_id = %project_id,
                    repaired = results.iter().filter(|r| r.success).count(),
                    failed = results.iter().filter(|r| !r.success).count(),
                    "Automatic repair finished"
                ),
                Err(e) => error!(project_id = %project_id, error = %e, "Automatic repair failed"),
            }
        }
        reports.push(report);
    }
    reports
}

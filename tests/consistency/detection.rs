//! Issue detection by project scans

use crate::common::*;
use tandem::{Severity, SyncStatus};

#[tokio::test]
async fn half_written_entity_reports_missing_graph() {
    let env = TestEnv::new();
    env.create_file("p1", "f1", true, false).await;

    let mapping = env.ids().require_mapping("f1").unwrap();
    assert_eq!(mapping.vector_id.as_deref(), Some("vector_f1"));
    assert_eq!(mapping.graph_id, None);

    let report = env.checker().check_project_consistency("p1").await.unwrap();
    assert_eq!(report.project_id, "p1");
    assert_eq!(report.total_entities, 1);
    assert_eq!(report.issues_found, 1);

    let issue = &report.issues[0];
    assert_eq!(issue.issue_type, IssueType::MissingGraph);
    assert_eq!(issue.entity_id, "f1");
    assert_eq!(issue.severity, Severity::Medium);
    assert!(!issue.is_resolved());
}

#[tokio::test]
async fn fully_written_entities_are_clean_and_confirmed() {
    let env = TestEnv::new();
    env.create_file("p1", "a", true, true).await;
    env.create_file("p1", "b", true, true).await;

    let report = env.checker().check_project_consistency("p1").await.unwrap();
    assert_eq!(report.total_entities, 2);
    assert_eq!(report.issues_found, 0);
    assert_eq!(
        env.ids().require_mapping("a").unwrap().sync_status,
        SyncStatus::Synced
    );
}

#[tokio::test]
async fn scan_is_scoped_to_one_project() {
    let env = TestEnv::new();
    env.create_file("p1", "a", true, false).await;
    env.create_file("p2", "b", false, true).await;

    let report = env.checker().check_project_consistency("p2").await.unwrap();
    assert_eq!(report.total_entities, 1);
    assert_eq!(report.issues[0].issue_type, IssueType::MissingVector);
    assert!(env
        .checker()
        .get_issues(&IssueFilter::all().project("p1"))
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn diverged_content_reports_mismatch_and_flags_conflict() {
    let env = TestEnv::new();
    env.create_file("p1", "f1", true, true).await;
    env.graph
        .insert_object("graph_f1", Chunk::new("f1", "stale body"));

    let report = env.checker().check_project_consistency("p1").await.unwrap();
    assert_eq!(report.issues_found, 1);
    assert_eq!(report.issues[0].issue_type, IssueType::DataMismatch);
    assert_eq!(report.issues[0].severity, Severity::High);
    assert_eq!(
        env.ids().require_mapping("f1").unwrap().sync_status,
        SyncStatus::Conflict
    );
}

#[tokio::test]
async fn vanished_object_reports_orphan() {
    let env = TestEnv::new();
    env.create_file("p1", "f1", true, true).await;
    env.vector.remove_object("vector_f1");

    let report = env.checker().check_project_consistency("p1").await.unwrap();
    assert_eq!(report.issues_found, 1);
    assert_eq!(report.issues[0].issue_type, IssueType::OrphanedEntity);
    assert!(report.issues[0].description.contains("vector_f1"));
}

#[tokio::test]
async fn lookup_failures_skip_the_entity() {
    let env = TestEnv::new();
    env.create_file("p1", "f1", true, true).await;
    env.graph.fail_lookups(true);

    let report = env.checker().check_project_consistency("p1").await.unwrap();
    assert_eq!(report.total_entities, 1);
    assert_eq!(report.issues_found, 0);

    env.graph.fail_lookups(false);
    env.graph.remove_object("graph_f1");
    let report = env.checker().check_project_consistency("p1").await.unwrap();
    assert_eq!(report.issues[0].issue_type, IssueType::OrphanedEntity);
}

#[tokio::test]
async fn empty_project_scans_cleanly() {
    let env = TestEnv::new();
    let report = env.checker().check_project_consistency("nothing").await.unwrap();
    assert_eq!(report.total_entities, 0);
    assert_eq!(report.issues_found, 0);
    assert!(report.issues.is_empty());
}

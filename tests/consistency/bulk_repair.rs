//! Bulk repair, statistics and issue housekeeping

use crate::common::*;
use tandem::actions;

#[tokio::test]
async fn one_failing_repair_does_not_stop_the_rest() {
    let env = TestEnv::new();
    for id in ["a", "b", "c"] {
        env.create_file("p1", id, true, false).await;
    }
    let report = env.checker().check_project_consistency("p1").await.unwrap();
    assert_eq!(report.issues_found, 3);

    env.graph.fail_chunk("b");
    let results = env
        .checker()
        .repair_all_issues(Some("p1"), RepairStrategy::Auto)
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results.iter().filter(|r| !r.success).count(), 1);

    let failed = results.iter().find(|r| !r.success).unwrap();
    let failed_issue = report.issues.iter().find(|i| i.id == failed.issue_id).unwrap();
    assert_eq!(failed_issue.entity_id, "b");

    assert!(env.graph.contains("graph_a"));
    assert!(!env.graph.contains("graph_b"));
    assert!(env.graph.contains("graph_c"));
    assert!(env.vector.contains("vector_b"));

    let stats = env.checker().get_consistency_stats(Some("p1")).unwrap();
    assert_eq!(stats.total_issues, 3);
    assert_eq!(stats.resolved, 2);
    assert_eq!(stats.unresolved, 1);
    assert_eq!(stats.by_type.get(&IssueType::MissingGraph), Some(&3));
    assert!((stats.resolution_rate - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(stats.repairs_attempted, 3);
    assert_eq!(stats.repairs_succeeded, 2);
}

#[tokio::test]
async fn manual_bulk_repair_rejects_every_issue() {
    let env = TestEnv::new();
    env.create_file("p1", "a", true, false).await;
    env.create_file("p1", "b", false, true).await;
    env.checker().check_project_consistency("p1").await.unwrap();

    let results = env
        .checker()
        .repair_all_issues(None, RepairStrategy::Manual)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results
        .iter()
        .all(|r| !r.success && r.action == actions::REPAIR_REJECTED));
    assert!(env.checker().get_repair_history(None).unwrap().is_empty());
}

#[tokio::test]
async fn bulk_repair_respects_project_scope() {
    let env = TestEnv::new();
    env.create_file("p1", "a", true, false).await;
    env.create_file("p2", "b", true, false).await;
    env.checker().check_project_consistency("p1").await.unwrap();
    env.checker().check_project_consistency("p2").await.unwrap();

    let results = env
        .checker()
        .repair_all_issues(Some("p2"), RepairStrategy::Auto)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(env.graph.contains("graph_b"));
    assert!(!env.graph.contains("graph_a"));

    let p1 = env.checker().get_consistency_stats(Some("p1")).unwrap();
    assert_eq!(p1.unresolved, 1);
    assert_eq!(p1.repairs_attempted, 0);
}

#[tokio::test]
async fn clearing_resolved_issues_keeps_open_ones() {
    let env = TestEnv::new();
    env.create_file("p1", "a", true, false).await;
    env.create_file("p1", "b", true, false).await;
    let report = env.checker().check_project_consistency("p1").await.unwrap();

    env.checker()
        .repair_issue(report.issues[0].id, RepairStrategy::Auto)
        .await
        .unwrap();
    assert_eq!(env.checker().clear_resolved_issues(Some("p1")).unwrap(), 1);
    assert_eq!(env.checker().clear_resolved_issues(Some("p1")).unwrap(), 0);

    let remaining = env.checker().get_issues(&IssueFilter::all()).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, report.issues[1].id);
}

#[tokio::test]
async fn empty_issue_table_has_zero_resolution_rate() {
    let env = TestEnv::new();
    let stats = env.checker().get_consistency_stats(None).unwrap();
    assert_eq!(stats.total_issues, 0);
    assert_eq!(stats.resolution_rate, 0.0);
}

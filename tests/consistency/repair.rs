//! Single-issue repair

use crate::common::*;
use tandem::{actions, SyncStatus};

#[tokio::test]
async fn missing_graph_is_rebuilt_from_vector_side() {
    let env = TestEnv::new();
    env.create_file("p1", "f1", true, false).await;

    let report = env.checker().check_project_consistency("p1").await.unwrap();
    let issue_id = report.issues[0].id;

    let result = env
        .checker()
        .repair_issue(issue_id, RepairStrategy::Auto)
        .await
        .unwrap();
    assert!(result.success, "{}", result.message);
    assert_eq!(result.action, actions::CREATED_GRAPH_DATA);

    let mapping = env.ids().require_mapping("f1").unwrap();
    assert_eq!(mapping.vector_id.as_deref(), Some("vector_f1"));
    assert_eq!(mapping.graph_id.as_deref(), Some("graph_f1"));
    assert_eq!(
        env.graph.object("graph_f1").unwrap().content,
        "source of f1"
    );

    let issue = env
        .checker()
        .get_issues(&IssueFilter::all().entity("f1"))
        .unwrap()
        .remove(0);
    assert!(issue.is_resolved());
    assert_eq!(issue.resolution.as_deref(), Some(actions::CREATED_GRAPH_DATA));

    let rescan = env.checker().check_project_consistency("p1").await.unwrap();
    assert_eq!(rescan.issues_found, 0);
}

#[tokio::test]
async fn missing_vector_is_rebuilt_from_graph_side() {
    let env = TestEnv::new();
    env.create_file("p1", "n1", false, true).await;

    let report = env.checker().check_project_consistency("p1").await.unwrap();
    let result = env
        .checker()
        .repair_issue(report.issues[0].id, RepairStrategy::Auto)
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.action, actions::CREATED_VECTOR_DATA);
    assert!(env.vector.contains("vector_n1"));
}

#[tokio::test]
async fn failed_repair_keeps_the_other_side_and_the_issue() {
    let env = TestEnv::new();
    env.create_file("p1", "f1", true, false).await;
    let report = env.checker().check_project_consistency("p1").await.unwrap();
    let issue_id = report.issues[0].id;

    env.graph.fail_next_stores(1);
    let result = env
        .checker()
        .repair_issue(issue_id, RepairStrategy::Auto)
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.action, actions::CREATED_GRAPH_DATA);

    assert!(env.vector.contains("vector_f1"));
    assert!(env.graph.is_empty());
    let mapping = env.ids().require_mapping("f1").unwrap();
    assert_eq!(mapping.vector_id.as_deref(), Some("vector_f1"));
    assert_eq!(mapping.graph_id, None);

    let unresolved = env
        .checker()
        .get_issues(&IssueFilter::unresolved(Some("p1")))
        .unwrap();
    assert_eq!(unresolved.len(), 1);

    // A retry goes through once the store recovers
    let retry = env
        .checker()
        .repair_issue(issue_id, RepairStrategy::Auto)
        .await
        .unwrap();
    assert!(retry.success);

    let history = env.checker().get_repair_history(None).unwrap();
    assert_eq!(history.len(), 2);
    assert!(!history[0].success);
    assert!(history[1].success);
}

#[tokio::test]
async fn mismatch_is_repaired_from_vector_content() {
    let env = TestEnv::new();
    env.create_file("p1", "f1", true, true).await;
    env.graph
        .insert_object("graph_f1", Chunk::new("f1", "stale body"));

    let report = env.checker().check_project_consistency("p1").await.unwrap();
    let result = env
        .checker()
        .repair_issue(report.issues[0].id, RepairStrategy::Auto)
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.action, actions::REWROTE_GRAPH_DATA);

    assert_eq!(
        env.graph.object("graph_f1").unwrap().content,
        env.vector.object("vector_f1").unwrap().content
    );
    assert_eq!(
        env.ids().require_mapping("f1").unwrap().sync_status,
        SyncStatus::Synced
    );
    let rescan = env.checker().check_project_consistency("p1").await.unwrap();
    assert_eq!(rescan.issues_found, 0);
}

#[tokio::test]
async fn orphan_repair_removes_mapping_and_survivors() {
    let env = TestEnv::new();
    env.create_file("p1", "f1", true, true).await;
    env.vector.remove_object("vector_f1");

    let report = env.checker().check_project_consistency("p1").await.unwrap();
    let result = env
        .checker()
        .repair_issue(report.issues[0].id, RepairStrategy::Auto)
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.action, actions::REMOVED_ORPHANED_MAPPING);

    assert!(env.ids().get_mapping("f1").unwrap().is_none());
    assert!(!env.graph.contains("graph_f1"));
    let deletes = env.journal.deletes();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].store, StepType::Graph);

    let rescan = env.checker().check_project_consistency("p1").await.unwrap();
    assert_eq!(rescan.total_entities, 0);
}

#[tokio::test]
async fn repair_after_entity_was_fixed_elsewhere_needs_no_action() {
    let env = TestEnv::new();
    env.create_file("p1", "f1", true, false).await;
    let report = env.checker().check_project_consistency("p1").await.unwrap();

    let synced = env.service().sync_entity("f1").await.unwrap();
    assert!(synced.success);

    let result = env
        .checker()
        .repair_issue(report.issues[0].id, RepairStrategy::Auto)
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.action, actions::NO_ACTION_REQUIRED);
}

#[tokio::test]
async fn refused_repairs() {
    let env = TestEnv::new();
    env.create_file("p1", "f1", true, false).await;
    let report = env.checker().check_project_consistency("p1").await.unwrap();
    let issue_id = report.issues[0].id;

    assert!(matches!(
        env.checker()
            .repair_issue(issue_id, RepairStrategy::Manual)
            .await,
        Err(TandemError::ManualRepairUnsupported { .. })
    ));

    env.checker()
        .repair_issue(issue_id, RepairStrategy::Auto)
        .await
        .unwrap();
    assert!(matches!(
        env.checker()
            .repair_issue(issue_id, RepairStrategy::Auto)
            .await,
        Err(TandemError::AlreadyResolved { .. })
    ));

    assert!(matches!(
        env.checker()
            .repair_issue(tandem::IssueId::new(), RepairStrategy::Auto)
            .await,
        Err(TandemError::NotFound { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_repairs_of_one_entity_write_once() {
    let env = TestEnv::new();
    env.create_file("p1", "f1", true, false).await;
    let first = env.checker().check_project_consistency("p1").await.unwrap();
    let second = env.checker().check_project_consistency("p1").await.unwrap();
    let issue_ids = [first.issues[0].id, second.issues[0].id];
    assert_ne!(issue_ids[0], issue_ids[1]);
    env.journal.clear();

    let handles: Vec<_> = issue_ids
        .into_iter()
        .map(|issue_id| {
            let checker = env.tandem.checker().clone();
            tokio::spawn(async move { checker.repair_issue(issue_id, RepairStrategy::Auto).await })
        })
        .collect();
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }

    assert!(results.iter().all(|r| r.success));
    let mut actions_taken: Vec<&str> = results.iter().map(|r| r.action.as_str()).collect();
    actions_taken.sort_unstable();
    assert_eq!(
        actions_taken,
        vec![actions::CREATED_GRAPH_DATA, actions::NO_ACTION_REQUIRED]
    );

    let graph_writes = env
        .journal
        .calls()
        .into_iter()
        .filter(|c| c.store == StepType::Graph && c.action == CallAction::Store)
        .count();
    assert_eq!(graph_writes, 1);
    assert_eq!(env.graph.len(), 1);

    let mapping = env.ids().require_mapping("f1").unwrap();
    assert_eq!(mapping.vector_id.as_deref(), Some("vector_f1"));
    assert_eq!(mapping.graph_id.as_deref(), Some("graph_f1"));
}

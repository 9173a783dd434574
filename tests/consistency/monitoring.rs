//! Background sweeps and project sync

use std::time::Duration;

use crate::common::*;

#[tokio::test]
async fn sweep_with_auto_repair_heals_watched_projects() {
    let mut config = TandemConfig::default();
    config.consistency.auto_repair = true;
    let env = TestEnv::with_config(config);
    env.create_file("p1", "f1", true, false).await;
    env.create_file("p2", "f2", true, false).await;

    let monitor = env.tandem.monitor();
    monitor.watch_project("p1");
    let reports = monitor.run_once().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].issues_found, 1);

    assert!(env.graph.contains("graph_f1"));
    assert!(!env.graph.contains("graph_f2"));
    let stats = env.checker().get_consistency_stats(Some("p1")).unwrap();
    assert_eq!(stats.resolved, 1);
}

#[tokio::test]
async fn background_monitor_stops_on_shutdown() {
    let env = TestEnv::new();
    env.create_file("p1", "f1", false, true).await;

    let monitor = env
        .tandem
        .monitor()
        .with_interval(Duration::from_millis(10));
    monitor.watch_project("p1");
    let handle = monitor.start();

    tokio::time::sleep(Duration::from_millis(100)).await;
    monitor.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    let issues = env
        .checker()
        .get_issues(&IssueFilter::all().issue_type(IssueType::MissingVector))
        .unwrap();
    assert!(!issues.is_empty());
    assert!(env.vector.is_empty());
}

#[tokio::test]
async fn sync_project_completes_half_written_entities() {
    let env = TestEnv::new();
    env.create_file("p1", "a", true, false).await;
    env.create_file("p1", "b", false, true).await;
    env.create_file("p1", "c", true, true).await;

    let results = env.service().sync_project("p1").await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success));

    assert!(env.graph.contains("graph_a"));
    assert!(env.vector.contains("vector_b"));
    let report = env.checker().check_project_consistency("p1").await.unwrap();
    assert_eq!(report.issues_found, 0);
}

#[tokio::test]
async fn sync_project_rewrites_flagged_mismatch_before_confirming() {
    let env = TestEnv::new();
    env.create_file("p1", "d", true, true).await;
    env.graph.insert_object("graph_d", Chunk::new("d", "edited"));

    let report = env.checker().check_project_consistency("p1").await.unwrap();
    assert_eq!(report.issues[0].issue_type, IssueType::DataMismatch);

    let results = env.service().sync_project("p1").await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(
        env.graph.object("graph_d").unwrap().content,
        env.vector.object("vector_d").unwrap().content
    );

    let rescan = env.checker().check_project_consistency("p1").await.unwrap();
    assert_eq!(rescan.issues_found, 0);
}

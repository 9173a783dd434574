//! Named entity batches

use crate::common::*;
use tandem::{BatchItem, ObjectKind};

fn create(id: &str, vector: bool, graph: bool) -> BatchItem {
    BatchItem::Create {
        entity_type: EntityType::File,
        project_id: "p1".to_string(),
        vector_payload: vector.then(|| file_chunk(id)),
        graph_payload: graph.then(|| file_chunk(id)),
    }
}

#[tokio::test]
async fn batch_items_run_in_isolation() {
    let env = TestEnv::new();
    let service = env.service();

    let batch_id = service.create_batch(
        "initial index",
        vec![
            create("a", true, true),
            create("b", true, false),
            BatchItem::Update {
                entity_id: "b".to_string(),
                vector_payload: None,
                graph_payload: Some(file_chunk("b")),
            },
            create("a", true, false),
            BatchItem::Update {
                entity_id: "missing".to_string(),
                vector_payload: Some(file_chunk("missing")),
                graph_payload: None,
            },
        ],
    );
    assert_eq!(service.pending_batches().len(), 1);

    let report = service.execute_batch(batch_id).await.unwrap();
    assert_eq!(report.name, "initial index");
    assert_eq!(report.results.len(), 5);
    assert_eq!(report.succeeded(), 3);
    assert_eq!(report.failed(), 2);

    assert!(report.results[0].success);
    assert_eq!(report.results[2].graph_id.as_deref(), Some("graph_b"));
    assert!(!report.results[3].success);
    assert!(!report.results[4].success);
    assert_eq!(report.results[4].entity_id.as_deref(), Some("missing"));

    assert!(env.ids().require_mapping("b").unwrap().is_consistent());
    assert!(service.pending_batches().is_empty());
}

#[tokio::test]
async fn batches_execute_once() {
    let env = TestEnv::new();
    let batch_id = env.service().create_batch("once", vec![create("a", true, false)]);
    env.service().execute_batch(batch_id).await.unwrap();

    match env.service().execute_batch(batch_id).await {
        Err(TandemError::NotFound { kind, .. }) => assert_eq!(kind, ObjectKind::Batch),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn duplicate_create_is_refused() {
    let env = TestEnv::new();
    env.create_file("p1", "a", true, false).await;

    let err = env
        .service()
        .create_entity(EntityType::File, "p1", Some(file_chunk("a")), None)
        .await
        .unwrap_err();
    assert!(matches!(err, TandemError::DuplicateEntity { .. }));
    assert_eq!(env.vector.len(), 1);
}

#[tokio::test]
async fn creation_failure_leaves_no_trace() {
    let env = TestEnv::new();
    env.graph.fail_next_stores(1);

    let err = env
        .service()
        .create_entity(
            EntityType::File,
            "p1",
            Some(file_chunk("a")),
            Some(file_chunk("a")),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TandemError::StepExecution { .. }));
    assert!(env.vector.is_empty());
    assert!(env.ids().get_mapping("a").unwrap().is_none());
}

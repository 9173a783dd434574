//! One-shot transactions through the coordinator

use crate::common::*;
use tandem::{GraphOp, MappingOp, TransactionOperation, TransactionStatus, VectorOp};

fn bind(entity_id: &str) -> TransactionOperation {
    TransactionOperation::new(MappingOp::Bind {
        entity_id: entity_id.to_string(),
        entity_type: EntityType::Chunk,
        project_id: "p1".to_string(),
    })
    .with_compensation(MappingOp::Delete {
        entity_id: entity_id.to_string(),
    })
}

#[tokio::test]
async fn successful_transaction_binds_created_ids() {
    let env = TestEnv::new();
    let operations = vec![
        TransactionOperation::store_vectors(vec![file_chunk("c1")]),
        TransactionOperation::store_nodes(vec![file_chunk("c1")]),
        bind("c1"),
    ];

    let result = env
        .coordinator()
        .execute_transaction("p1", operations)
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.executed_steps, 3);
    assert_eq!(result.first_created_id(StepType::Vector), Some("vector_c1"));

    let mapping = env.ids().require_mapping("c1").unwrap();
    assert_eq!(mapping.vector_id.as_deref(), Some("vector_c1"));
    assert_eq!(mapping.graph_id.as_deref(), Some("graph_c1"));

    let txn = env
        .coordinator()
        .get_transaction(result.transaction_id)
        .unwrap()
        .unwrap();
    assert_eq!(txn.status, TransactionStatus::Completed);
    assert!(txn.completed_at.is_some());
    assert!(env.coordinator().get_active_transactions().is_empty());
}

#[tokio::test]
async fn failure_compensates_in_reverse_order() {
    let env = TestEnv::new();
    env.graph.fail_chunk("c2");
    let operations = vec![
        TransactionOperation::store_vectors(vec![file_chunk("c1")]),
        TransactionOperation::store_nodes(vec![file_chunk("c1")]),
        TransactionOperation::store_nodes(vec![file_chunk("c2")]),
        bind("c1"),
    ];

    let result = env
        .coordinator()
        .execute_transaction("p1", operations)
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.failed_step, Some(StepType::Graph));
    assert!(result.error.is_some());

    let deletes = env.journal.deletes();
    let order: Vec<(StepType, Vec<String>)> =
        deletes.into_iter().map(|c| (c.store, c.ids)).collect();
    assert_eq!(
        order,
        vec![
            (StepType::Graph, vec!["graph_c1".to_string()]),
            (StepType::Vector, vec!["vector_c1".to_string()]),
        ]
    );
    assert!(env.vector.is_empty());
    assert!(env.graph.is_empty());
    assert!(env.ids().get_mapping("c1").unwrap().is_none());

    let txn = env
        .coordinator()
        .get_transaction(result.transaction_id)
        .unwrap()
        .unwrap();
    assert_eq!(txn.status, TransactionStatus::Failed);
    assert!(txn.steps[0].compensated);
    assert!(txn.steps[1].compensated);
    assert!(!txn.steps[2].executed);
    assert!(!txn.steps[3].executed);
}

#[tokio::test]
async fn steps_without_compensation_are_left_in_place() {
    let env = TestEnv::new();
    env.graph.fail_next_stores(1);
    let operations = vec![
        TransactionOperation::new(VectorOp::StoreChunks {
            chunks: vec![file_chunk("c1")],
        }),
        TransactionOperation::new(GraphOp::StoreChunks {
            chunks: vec![file_chunk("c1")],
        }),
    ];

    let result = env
        .coordinator()
        .execute_transaction("p1", operations)
        .await
        .unwrap();
    assert!(!result.success);
    assert!(env.vector.contains("vector_c1"));
    assert!(env.journal.deletes().is_empty());
}

#[tokio::test]
async fn mismatched_compensation_is_rejected_before_dispatch() {
    let env = TestEnv::new();
    let operations = vec![TransactionOperation::store_vectors(vec![file_chunk("c1")])
        .with_compensation(GraphOp::DeleteNodes { ids: vec![] })];

    let err = env
        .coordinator()
        .execute_transaction("p1", operations)
        .await
        .unwrap_err();
    assert!(matches!(err, TandemError::UnknownOperationType(_)));
    assert!(env.journal.is_empty());
}

#[tokio::test]
async fn history_is_bounded_and_filterable() {
    let env = TestEnv::new();
    for (project, id) in [("p1", "a"), ("p2", "b"), ("p1", "c")] {
        env.create_file(project, id, true, false).await;
    }

    let history = env.coordinator().get_transaction_history(None).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(
        env.coordinator().get_transaction_history(Some(2)).unwrap().len(),
        2
    );
    let p1 = env.coordinator().get_project_history("p1").unwrap();
    assert_eq!(p1.len(), 2);
    assert!(p1.iter().all(|t| t.project_id == "p1"));
}

#[tokio::test]
async fn configured_history_limit_applies_by_default() {
    let mut config = TandemConfig::default();
    config.history.default_limit = 2;
    let env = TestEnv::with_config(config);
    for id in ["a", "b", "c"] {
        env.create_file("p1", id, true, true).await;
    }
    assert_eq!(env.coordinator().get_transaction_history(None).unwrap().len(), 2);
}

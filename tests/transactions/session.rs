//! The begin / add / commit session API

use crate::common::*;
use tandem::{GraphOp, TransactionStatus, VectorOp};

#[tokio::test]
async fn failed_commit_compensates_earlier_steps() {
    let env = TestEnv::new();
    let coordinator = env.coordinator();

    let id = coordinator.begin_transaction("p1").unwrap();
    coordinator
        .add_vector_operation(
            VectorOp::StoreChunks {
                chunks: vec![file_chunk("x")],
            },
            Some(VectorOp::DeleteChunks { ids: vec![] }),
        )
        .unwrap();
    coordinator
        .add_graph_operation(
            GraphOp::StoreChunks {
                chunks: vec![file_chunk("x")],
            },
            Some(GraphOp::DeleteNodes { ids: vec![] }),
        )
        .unwrap();

    env.graph.fail_next_stores(1);
    assert!(!coordinator.commit_transaction().await.unwrap());

    let calls: Vec<(StepType, CallAction)> = env
        .journal
        .calls()
        .into_iter()
        .map(|c| (c.store, c.action))
        .collect();
    assert_eq!(
        calls,
        vec![
            (StepType::Vector, CallAction::Store),
            (StepType::Graph, CallAction::Store),
            (StepType::Vector, CallAction::Delete),
        ]
    );
    assert_eq!(env.journal.deletes()[0].ids, vec!["vector_x".to_string()]);
    assert!(env.vector.is_empty());

    assert_eq!(coordinator.session_transaction(), None);
    let txn = coordinator.get_transaction(id).unwrap().unwrap();
    assert_eq!(txn.status, TransactionStatus::Failed);
}

#[tokio::test]
async fn successful_commit_releases_the_session() {
    let env = TestEnv::new();
    let coordinator = env.coordinator();

    coordinator.begin_transaction("p1").unwrap();
    coordinator
        .add_vector_operation(
            VectorOp::StoreChunks {
                chunks: vec![file_chunk("x")],
            },
            None,
        )
        .unwrap();
    assert!(coordinator.commit_transaction().await.unwrap());
    assert!(env.vector.contains("vector_x"));
    assert_eq!(coordinator.session_transaction(), None);
    assert!(coordinator.begin_transaction("p1").is_ok());
}

#[tokio::test]
async fn only_one_session_transaction_at_a_time() {
    let env = TestEnv::new();
    let coordinator = env.coordinator();

    let first = coordinator.begin_transaction("p1").unwrap();
    match coordinator.begin_transaction("p1") {
        Err(TandemError::TransactionInProgress { transaction_id }) => {
            assert_eq!(transaction_id, first)
        }
        other => panic!("expected TransactionInProgress, got {:?}", other),
    }
    assert_eq!(coordinator.session_transaction(), Some(first));
}

#[tokio::test]
async fn session_calls_without_open_transaction_fail() {
    let env = TestEnv::new();
    let coordinator = env.coordinator();

    assert!(matches!(
        coordinator.add_graph_operation(GraphOp::DeleteNodes { ids: vec![] }, None),
        Err(TandemError::NoActiveTransaction)
    ));
    assert!(matches!(
        coordinator.commit_transaction().await,
        Err(TandemError::NoActiveTransaction)
    ));
    assert!(matches!(
        coordinator.rollback_transaction().await,
        Err(TandemError::NoActiveTransaction)
    ));
}

#[tokio::test]
async fn rollback_discards_pending_steps() {
    let env = TestEnv::new();
    let coordinator = env.coordinator();

    let id = coordinator.begin_transaction("p1").unwrap();
    coordinator
        .add_vector_operation(
            VectorOp::StoreChunks {
                chunks: vec![file_chunk("x")],
            },
            Some(VectorOp::DeleteChunks { ids: vec![] }),
        )
        .unwrap();
    coordinator.rollback_transaction().await.unwrap();

    assert!(env.journal.is_empty());
    assert_eq!(coordinator.session_transaction(), None);
    let txn = coordinator.get_transaction(id).unwrap().unwrap();
    assert_eq!(txn.status, TransactionStatus::Failed);
    assert_eq!(txn.error.as_deref(), Some("rolled back"));
}

#[tokio::test]
async fn cancel_only_affects_pending_transactions() {
    let env = TestEnv::new();
    let coordinator = env.coordinator();

    let id = coordinator.begin_transaction("p1").unwrap();
    assert_eq!(coordinator.get_active_transactions().len(), 1);
    assert!(coordinator.cancel_transaction(id).unwrap());
    assert!(!coordinator.cancel_transaction(id).unwrap());
    assert!(coordinator.get_active_transactions().is_empty());
    assert_eq!(coordinator.session_transaction(), None);

    let txn = coordinator.get_transaction(id).unwrap().unwrap();
    assert_eq!(txn.error.as_deref(), Some("cancelled"));
}

use chrono::Utc;
use loomcore::{
    NodeExecutionUpdate, NodeStatus, RecordStore, RunStatus, StoreError, WorkflowId,
};
use loomruntime::InMemoryRecordStore;
use serde_json::json;

#[tokio::test]
async fn test_run_lifecycle() {
    let store = InMemoryRecordStore::new();
    let workflow_id = WorkflowId::new_v4();

    let run = store.create_run(workflow_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Running);
    assert!(run.completed_at.is_none());

    store
        .update_run_status(run.id, RunStatus::Completed, Some(Utc::now()))
        .await
        .unwrap();

    let snapshot = store.get_run(run.id).await.unwrap().unwrap();
    assert_eq!(snapshot.run.status, RunStatus::Completed);
    assert!(snapshot.run.completed_at.is_some());

    // Terminal statuses are final.
    let again = store.update_run_status(run.id, RunStatus::Failed, None).await;
    assert!(matches!(again, Err(StoreError::Backend(_))));
}

#[tokio::test]
async fn test_node_execution_is_written_once() {
    let store = InMemoryRecordStore::new();
    let run = store.create_run(WorkflowId::new_v4()).await.unwrap();

    let execution = store.create_node_execution(run.id, "llm").await.unwrap();
    assert_eq!(execution.status, NodeStatus::Running);
    assert!(store.create_node_execution(run.id, "llm").await.is_err());

    let mut inputs = serde_json::Map::new();
    inputs.insert("user_message".to_string(), json!("hi"));
    store
        .update_node_execution(
            run.id,
            "llm",
            NodeExecutionUpdate::success(inputs.clone(), json!({ "output": "ok" })),
        )
        .await
        .unwrap();

    let overwrite = store
        .update_node_execution(run.id, "llm", NodeExecutionUpdate::error(inputs, "late"))
        .await;
    assert!(overwrite.is_err());

    let snapshot = store.get_run(run.id).await.unwrap().unwrap();
    let llm = snapshot.execution("llm").unwrap();
    assert_eq!(llm.status, NodeStatus::Success);
    assert_eq!(llm.error, None);
    assert_eq!(llm.inputs.get("user_message"), Some(&json!("hi")));
}

#[tokio::test]
async fn test_unknown_records() {
    let store = InMemoryRecordStore::new();
    let missing = WorkflowId::new_v4();

    assert!(store.get_run(missing).await.unwrap().is_none());
    assert!(matches!(
        store.update_run_status(missing, RunStatus::Failed, None).await,
        Err(StoreError::RunNotFound(id)) if id == missing
    ));

    let run = store.create_run(WorkflowId::new_v4()).await.unwrap();
    let result = store
        .update_node_execution(run.id, "ghost", NodeExecutionUpdate::error(Default::default(), "x"))
        .await;
    assert!(matches!(result, Err(StoreError::NodeExecutionNotFound { .. })));
}

#[tokio::test]
async fn test_history_is_per_workflow_and_newest_first() {
    let store = InMemoryRecordStore::new();
    let workflow_id = WorkflowId::new_v4();
    let other = WorkflowId::new_v4();

    let first = store.create_run(workflow_id).await.unwrap();
    store.create_run(other).await.unwrap();
    let second = store.create_run(workflow_id).await.unwrap();

    let runs = store.list_runs(workflow_id).await.unwrap();
    let ids: Vec<_> = runs.iter().map(|r| r.run.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);

    let latest = store.get_latest_run(workflow_id).await.unwrap().unwrap();
    assert_eq!(latest.run.id, second.id);
    assert!(store.get_latest_run(WorkflowId::new_v4()).await.unwrap().is_none());
}

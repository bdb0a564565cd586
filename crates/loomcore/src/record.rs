use crate::{NodeId, PortValues, StoreError, WorkflowId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type RunId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeStatus {
    Running,
    Success,
    Error,
}

/// One end-to-end execution of a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub id: RunId,
    pub workflow_id: WorkflowId,
    pub status: RunStatus,
    pub triggered_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    pub fn new(workflow_id: WorkflowId) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            status: RunStatus::Running,
            triggered_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// The record of one node's attempt within one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecution {
    pub run_id: RunId,
    pub node_id: NodeId,
    pub status: NodeStatus,
    pub inputs: PortValues,
    pub outputs: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl NodeExecution {
    pub fn new(run_id: RunId, node_id: impl Into<NodeId>) -> Self {
        Self {
            run_id,
            node_id: node_id.into(),
            status: NodeStatus::Running,
            inputs: PortValues::new(),
            outputs: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Final state written to a node execution when the node finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeExecutionUpdate {
    pub status: NodeStatus,
    pub inputs: PortValues,
    pub outputs: Option<serde_json::Value>,
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl NodeExecutionUpdate {
    pub fn success(inputs: PortValues, outputs: serde_json::Value) -> Self {
        Self {
            status: NodeStatus::Success,
            inputs,
            outputs: Some(outputs),
            error: None,
            completed_at: Utc::now(),
        }
    }

    /// Failed executions keep their inputs but never carry outputs.
    pub fn error(inputs: PortValues, error: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Error,
            inputs,
            outputs: None,
            error: Some(error.into()),
            completed_at: Utc::now(),
        }
    }
}

/// A run together with the executions recorded so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    #[serde(flatten)]
    pub run: WorkflowRun,
    pub executions: Vec<NodeExecution>,
}

impl RunSnapshot {
    pub fn execution(&self, node_id: &str) -> Option<&NodeExecution> {
        self.executions.iter().find(|e| e.node_id == node_id)
    }
}

/// Persistence for run and node-execution records.
///
/// Snapshot queries order runs newest first by `triggered_at`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_run(&self, workflow_id: WorkflowId) -> Result<WorkflowRun, StoreError>;

    async fn update_run_status(
        &self,
        run_id: RunId,
        status: RunStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn create_node_execution(
        &self,
        run_id: RunId,
        node_id: &str,
    ) -> Result<NodeExecution, StoreError>;

    async fn update_node_execution(
        &self,
        run_id: RunId,
        node_id: &str,
        update: NodeExecutionUpdate,
    ) -> Result<(), StoreError>;

    async fn get_run(&self, run_id: RunId) -> Result<Option<RunSnapshot>, StoreError>;

    async fn get_latest_run(&self, workflow_id: WorkflowId) -> Result<Option<RunSnapshot>, StoreError>;

    async fn list_runs(&self, workflow_id: WorkflowId) -> Result<Vec<RunSnapshot>, StoreError>;
}

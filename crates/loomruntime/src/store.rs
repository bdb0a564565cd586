use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loomcore::{
    NodeExecution, NodeExecutionUpdate, NodeStatus, RecordStore, RunId, RunSnapshot, RunStatus,
    StoreError, WorkflowId, WorkflowRun,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Record store kept in process memory; records are lost on restart.
#[derive(Default)]
pub struct InMemoryRecordStore {
    inner: RwLock<Records>,
}

#[derive(Default)]
struct Records {
    runs: HashMap<RunId, RunSnapshot>,
    /// Run ids in creation order, used to break `triggered_at` ties.
    order: Vec<RunId>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Records {
    fn run_mut(&mut self, run_id: RunId) -> Result<&mut RunSnapshot, StoreError> {
        self.runs.get_mut(&run_id).ok_or(StoreError::RunNotFound(run_id))
    }

    fn newest_first(&self, workflow_id: WorkflowId) -> Vec<RunSnapshot> {
        let mut runs: Vec<RunSnapshot> = self
            .order
            .iter()
            .rev()
            .filter_map(|id| self.runs.get(id))
            .filter(|snapshot| snapshot.run.workflow_id == workflow_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.run.triggered_at.cmp(&a.run.triggered_at));
        runs
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create_run(&self, workflow_id: WorkflowId) -> Result<WorkflowRun, StoreError> {
        let run = WorkflowRun::new(workflow_id);
        let mut records = self.inner.write().await;
        records.order.push(run.id);
        records.runs.insert(
            run.id,
            RunSnapshot {
                run: run.clone(),
                executions: Vec::new(),
            },
        );
        Ok(run)
    }

    async fn update_run_status(
        &self,
        run_id: RunId,
        status: RunStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut records = self.inner.write().await;
        let snapshot = records.run_mut(run_id)?;
        if snapshot.run.status.is_terminal() {
            return Err(StoreError::Backend(format!(
                "run {} already finished as {:?}",
                run_id, snapshot.run.status
            )));
        }
        snapshot.run.status = status;
        snapshot.run.completed_at = completed_at;
        Ok(())
    }

    async fn create_node_execution(
        &self,
        run_id: RunId,
        node_id: &str,
    ) -> Result<NodeExecution, StoreError> {
        let mut records = self.inner.write().await;
        let snapshot = records.run_mut(run_id)?;
        if snapshot.execution(node_id).is_some() {
            return Err(StoreError::Backend(format!(
                "node {} already executed in run {}",
                node_id, run_id
            )));
        }
        let execution = NodeExecution::new(run_id, node_id);
        snapshot.executions.push(execution.clone());
        Ok(execution)
    }

    async fn update_node_execution(
        &self,
        run_id: RunId,
        node_id: &str,
        update: NodeExecutionUpdate,
    ) -> Result<(), StoreError> {
        let mut records = self.inner.write().await;
        let execution = records
            .run_mut(run_id)?
            .executions
            .iter_mut()
            .find(|e| e.node_id == node_id)
            .ok_or_else(|| StoreError::NodeExecutionNotFound {
                run_id,
                node_id: node_id.to_string(),
            })?;

        if execution.status != NodeStatus::Running {
            return Err(StoreError::Backend(format!(
                "execution of node {} in run {} already finished",
                node_id, run_id
            )));
        }

        execution.status = update.status;
        execution.inputs = update.inputs;
        execution.outputs = update.outputs;
        execution.error = update.error;
        execution.completed_at = Some(update.completed_at);
        Ok(())
    }

    async fn get_run(&self, run_id: RunId) -> Result<Option<RunSnapshot>, StoreError> {
        Ok(self.inner.read().await.runs.get(&run_id).cloned())
    }

    async fn get_latest_run(&self, workflow_id: WorkflowId) -> Result<Option<RunSnapshot>, StoreError> {
        Ok(self.inner.read().await.newest_first(workflow_id).into_iter().next())
    }

    async fn list_runs(&self, workflow_id: WorkflowId) -> Result<Vec<RunSnapshot>, StoreError> {
        Ok(self.inner.read().await.newest_first(workflow_id))
    }
}

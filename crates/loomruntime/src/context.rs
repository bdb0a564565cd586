use crate::resolver::OutputTable;
use loomcore::{EventBus, NodeId, NodeOutput, RecordStore, RunId, WorkflowId};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};

/// Everything a run's tasks share, passed explicitly to each of them.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub workflow_id: WorkflowId,
    pub store: Arc<dyn RecordStore>,
    pub events: Arc<EventBus>,
    outputs: Arc<RwLock<OutputTable>>,
}

impl RunContext {
    pub fn new(
        run_id: RunId,
        workflow_id: WorkflowId,
        store: Arc<dyn RecordStore>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            run_id,
            workflow_id,
            store,
            events,
            outputs: Arc::new(RwLock::new(OutputTable::new())),
        }
    }

    /// Read access to the outputs merged at earlier level barriers.
    pub async fn outputs(&self) -> RwLockReadGuard<'_, OutputTable> {
        self.outputs.read().await
    }

    /// Store a node's output. Each node writes at most once per run; a second
    /// write is refused and returns `false`.
    pub async fn record_output(&self, node_id: NodeId, output: NodeOutput) -> bool {
        let mut outputs = self.outputs.write().await;
        if outputs.contains_key(&node_id) {
            tracing::warn!("Output of node {} already recorded in run {}", node_id, self.run_id);
            return false;
        }
        outputs.insert(node_id, output);
        true
    }
}

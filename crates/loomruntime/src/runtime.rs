use crate::{InMemoryRecordStore, NodeRegistry, RunHandle, WorkflowExecutor};
use loomcore::{
    Edge, EventBus, ExecutionEvent, FlowError, NodeSpec, RecordStore, RunId, RunSnapshot, Workflow,
    WorkflowId,
};
use std::sync::Arc;

/// Main runtime: node handlers, record store and event bus behind one facade
pub struct LoomRuntime {
    registry: Arc<NodeRegistry>,
    store: Arc<dyn RecordStore>,
    executor: Arc<WorkflowExecutor>,
    event_bus: Arc<EventBus>,
}

impl LoomRuntime {
    /// Create a runtime with a pre-configured registry and an in-memory record store
    pub fn with_registry(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        Self::with_store(registry, Arc::new(InMemoryRecordStore::new()), config)
    }
    
    pub fn with_store(
        registry: Arc<NodeRegistry>,
        store: Arc<dyn RecordStore>,
        config: RuntimeConfig,
    ) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let executor = Arc::new(WorkflowExecutor::new(
            registry.clone(),
            store.clone(),
            event_bus.clone(),
        ));
        
        Self {
            registry,
            store,
            executor,
            event_bus,
        }
    }
    
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }
    
    /// Start a run of `nodes`/`edges` recorded under `workflow_id`.
    /// Returns as soon as the run record exists.
    pub async fn execute_workflow(
        &self,
        workflow_id: WorkflowId,
        nodes: Vec<NodeSpec>,
        edges: Vec<Edge>,
    ) -> Result<RunHandle, FlowError> {
        self.executor.execute_workflow(workflow_id, nodes, edges).await
    }
    
    /// Start a run of a workflow definition
    pub async fn execute(&self, workflow: Workflow) -> Result<RunHandle, FlowError> {
        self.executor.execute(workflow).await
    }
    
    pub async fn get_run(&self, run_id: RunId) -> Result<Option<RunSnapshot>, FlowError> {
        Ok(self.store.get_run(run_id).await?)
    }
    
    pub async fn latest_run(&self, workflow_id: WorkflowId) -> Result<Option<RunSnapshot>, FlowError> {
        Ok(self.store.get_latest_run(workflow_id).await?)
    }
    
    pub async fn list_runs(&self, workflow_id: WorkflowId) -> Result<Vec<RunSnapshot>, FlowError> {
        Ok(self.store.list_runs(workflow_id).await?)
    }
    
    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
        }
    }
}

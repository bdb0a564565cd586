use crate::context::RunContext;
use crate::plan::build_execution_plan;
use crate::registry::NodeRegistry;
use crate::resolver::resolve_inputs;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use loomcore::{
    validate_graph, Edge, EventBus, ExecutionEvent, FlowError, NodeContext, NodeExecutionUpdate,
    NodeId, NodeOutput, NodeSpec, PortValues, RecordStore, RunId, RunStatus, Workflow, WorkflowError,
    WorkflowId,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

/// Runs workflows level by level, every node of a level concurrently
pub struct WorkflowExecutor {
    registry: Arc<NodeRegistry>,
    store: Arc<dyn RecordStore>,
    event_bus: Arc<EventBus>,
}

impl WorkflowExecutor {
    pub fn new(
        registry: Arc<NodeRegistry>,
        store: Arc<dyn RecordStore>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            registry,
            store,
            event_bus,
        }
    }

    /// Start a run of the given graph and return without waiting for it.
    pub async fn execute_workflow(
        &self,
        workflow_id: WorkflowId,
        nodes: Vec<NodeSpec>,
        edges: Vec<Edge>,
    ) -> Result<RunHandle, FlowError> {
        self.execute(Workflow {
            id: workflow_id,
            name: String::new(),
            nodes,
            edges,
        })
        .await
    }

    /// Validate the graph, create the run record and spawn the run.
    ///
    /// Invalid graphs are rejected before any record exists. The spawned task
    /// owns the run until it reaches a terminal status; there is no way to
    /// abort it from outside.
    pub async fn execute(&self, workflow: Workflow) -> Result<RunHandle, FlowError> {
        workflow.validate()?;

        let run = self.store.create_run(workflow.id).await?;
        tracing::info!("Starting run {} of workflow {}", run.id, workflow.id);

        let ctx = RunContext::new(run.id, workflow.id, self.store.clone(), self.event_bus.clone());
        let task = tokio::spawn(drive_run(ctx, Arc::new(workflow), self.registry.clone()));

        Ok(RunHandle {
            run_id: run.id,
            workflow_id: run.workflow_id,
            task,
        })
    }
}

/// Handle to a run executing in the background.
///
/// Dropping the handle leaves the run going.
pub struct RunHandle {
    pub run_id: RunId,
    pub workflow_id: WorkflowId,
    task: JoinHandle<RunStatus>,
}

impl RunHandle {
    /// Wait for the run to reach its terminal status
    pub async fn wait(self) -> Result<RunStatus, FlowError> {
        self.task
            .await
            .map_err(|e| FlowError::Execution(format!("Run task join error: {}", e)))
    }
}

async fn drive_run(ctx: RunContext, workflow: Arc<Workflow>, registry: Arc<NodeRegistry>) -> RunStatus {
    let start_time = Instant::now();

    ctx.events.emit(ExecutionEvent::RunStarted {
        run_id: ctx.run_id,
        workflow_id: ctx.workflow_id,
        timestamp: Utc::now(),
    });

    let status = match execute_levels(&ctx, &workflow, &registry).await {
        Ok(()) => RunStatus::Completed,
        Err(e) => {
            tracing::error!("Run {} failed: {}", ctx.run_id, e);
            RunStatus::Failed
        }
    };

    if let Err(e) = ctx.store.update_run_status(ctx.run_id, status, Some(Utc::now())).await {
        tracing::error!("Failed to record final status of run {}: {}", ctx.run_id, e);
    }

    let duration_ms = start_time.elapsed().as_millis() as u64;
    tracing::info!("Run {} finished as {:?} in {}ms", ctx.run_id, status, duration_ms);

    ctx.events.emit(ExecutionEvent::RunFinished {
        run_id: ctx.run_id,
        status,
        duration_ms,
        timestamp: Utc::now(),
    });

    status
}

/// Execute the plan. A level's outputs are merged into the output table only
/// once every node of the level has finished; a failed node stops the run
/// after its siblings have drained.
async fn execute_levels(
    ctx: &RunContext,
    workflow: &Arc<Workflow>,
    registry: &Arc<NodeRegistry>,
) -> Result<(), FlowError> {
    let plan = build_execution_plan(&workflow.nodes, &workflow.edges)?;
    tracing::info!("Execution plan for run {}: {:?}", ctx.run_id, plan.levels);

    for (level, node_ids) in plan.levels.iter().enumerate() {
        ctx.events.emit(ExecutionEvent::LevelStarted {
            run_id: ctx.run_id,
            level,
            node_ids: node_ids.clone(),
            timestamp: Utc::now(),
        });

        let mut running: FuturesUnordered<_> = node_ids
            .iter()
            .map(|node_id| {
                let task = tokio::spawn(execute_node(
                    ctx.clone(),
                    workflow.clone(),
                    registry.clone(),
                    node_id.clone(),
                ));
                let node_id = node_id.clone();
                async move { (node_id, task.await) }
            })
            .collect();

        let mut finished = Vec::with_capacity(node_ids.len());
        let mut failure = None;

        while let Some((node_id, joined)) = running.next().await {
            match joined {
                Ok(Ok(output)) => finished.push((node_id, output)),
                Ok(Err(e)) => {
                    failure.get_or_insert(FlowError::Execution(format!("Node {} failed: {}", node_id, e)));
                }
                Err(e) => {
                    let error = format!("Node task aborted: {}", e);
                    record_aborted_node(ctx, &node_id, &error).await;
                    failure.get_or_insert(FlowError::Execution(format!("Node {} failed: {}", node_id, error)));
                }
            }
        }

        for (node_id, output) in finished {
            ctx.record_output(node_id, output).await;
        }

        if let Some(e) = failure {
            tracing::warn!("Level {} of run {} failed; skipping {} remaining levels",
                level, ctx.run_id, plan.len() - level - 1);
            return Err(e);
        }
    }

    Ok(())
}

async fn execute_node(
    ctx: RunContext,
    workflow: Arc<Workflow>,
    registry: Arc<NodeRegistry>,
    node_id: NodeId,
) -> Result<NodeOutput, FlowError> {
    run_node(&ctx, &workflow, &registry, &node_id).await
}

/// Close the record of a node whose task panicked or was cancelled, so it
/// never stays RUNNING.
async fn record_aborted_node(ctx: &RunContext, node_id: &str, error: &str) {
    tracing::error!("Node {} of run {} aborted: {}", node_id, ctx.run_id, error);
    ctx.events.emit(ExecutionEvent::NodeFailed {
        run_id: ctx.run_id,
        node_id: node_id.to_string(),
        error: error.to_string(),
        timestamp: Utc::now(),
    });

    if let Err(e) = ctx
        .store
        .update_node_execution(ctx.run_id, node_id, NodeExecutionUpdate::error(PortValues::new(), error))
        .await
    {
        tracing::error!("Failed to record abort of node {}: {}", node_id, e);
    }
}

async fn run_node(
    ctx: &RunContext,
    workflow: &Workflow,
    registry: &NodeRegistry,
    node_id: &str,
) -> Result<NodeOutput, FlowError> {
    let node = workflow
        .find_node(node_id)
        .ok_or_else(|| WorkflowError::NodeNotFound(node_id.to_string()))?;

    ctx.store.create_node_execution(ctx.run_id, &node.id).await?;

    ctx.events.emit(ExecutionEvent::NodeStarted {
        run_id: ctx.run_id,
        node_id: node.id.clone(),
        node_type: node.node_type.to_string(),
        timestamp: Utc::now(),
    });

    let inputs = {
        let outputs = ctx.outputs().await;
        resolve_inputs(&node.id, &workflow.edges, &outputs)
    };
    tracing::debug!("Resolved inputs for {}: {:?}", node.id, inputs);

    let node_ctx = NodeContext::new(
        ctx.run_id,
        node,
        inputs.clone(),
        ctx.events.create_emitter(ctx.run_id, node.id.clone()),
    );

    let start = Instant::now();
    let result = registry.dispatch(node_ctx).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(output) => {
            let record = if registry.passes_through(&node.node_type) {
                Value::Object(node.data.clone())
            } else {
                output.to_record()
            };
            ctx.store
                .update_node_execution(
                    ctx.run_id,
                    &node.id,
                    NodeExecutionUpdate::success(inputs, record),
                )
                .await?;

            tracing::info!("Node {} ({}) completed in {}ms", node.id, node.node_type, duration_ms);
            ctx.events.emit(ExecutionEvent::NodeCompleted {
                run_id: ctx.run_id,
                node_id: node.id.clone(),
                output: output.clone(),
                duration_ms,
                timestamp: Utc::now(),
            });

            Ok(output)
        }
        Err(e) => {
            tracing::error!("Node {} ({}) failed: {}", node.id, node.node_type, e);
            ctx.events.emit(ExecutionEvent::NodeFailed {
                run_id: ctx.run_id,
                node_id: node.id.clone(),
                error: e.to_string(),
                timestamp: Utc::now(),
            });

            ctx.store
                .update_node_execution(
                    ctx.run_id,
                    &node.id,
                    NodeExecutionUpdate::error(inputs, e.to_string()),
                )
                .await?;

            Err(e.into())
        }
    }
}

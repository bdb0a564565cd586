//! Workflow execution runtime
//! 
//! Levels a graph into an execution plan, resolves each node's inputs from
//! upstream outputs, dispatches nodes to their handlers and drives runs to
//! completion while keeping run and node-execution records current.

mod context;
mod executor;
mod plan;
mod registry;
pub mod resolver;
mod runtime;
mod store;

pub use context::RunContext;
pub use executor::{RunHandle, WorkflowExecutor};
pub use plan::{build_execution_plan, ExecutionPlan};
pub use registry::NodeRegistry;
pub use resolver::{resolve_inputs, OutputTable};
pub use runtime::{LoomRuntime, RuntimeConfig};
pub use store::InMemoryRecordStore;

//! Core abstractions for the loom workflow engine
//! 
//! Graph and record types, node output variants, the node trait and the
//! interfaces of every external collaborator. Nothing here executes a run.

pub mod backend;
mod error;
pub mod events;
mod node;
mod output;
mod record;
mod workflow;

pub use backend::{
    CropJob, CropPercent, FrameJob, GenerateRequest, GenerateResponse, MediaBackend, MediaInfo,
    ModelBackend, OutputTarget, PixelRect, FRAME_WIDTH,
};
pub use error::{FlowError, NodeError, StoreError, WorkflowError};
pub use events::*;
pub use node::{value_as_text, Node, NodeContext, NodeMetadata, PortDefinition};
pub use output::{MediaKind, NodeOutput, PortValues};
pub use record::{
    NodeExecution, NodeExecutionUpdate, NodeStatus, RecordStore, RunId, RunSnapshot, RunStatus,
    WorkflowRun,
};
pub use workflow::{validate_graph, Edge, NodeId, NodeSpec, NodeType, Position, Workflow, WorkflowId};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;

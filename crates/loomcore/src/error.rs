use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),
    
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),
    
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),
    
    #[error("Execution error: {0}")]
    Execution(String),
}

/// Failures local to a single node execution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),
    
    #[error("Configuration error: {0}")]
    Configuration(String),
    
    #[error("Model invocation failed: {0}")]
    ModelInvocation(String),
    
    #[error("Media processing failed: {0}")]
    MediaProcessing(String),
    
    #[error("Media source not found: {0}")]
    MediaSourceNotFound(String),
    
    #[error("Record store error: {0}")]
    RecordStore(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Cycle detected in workflow")]
    CycleDetected,
    
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),
    
    #[error("Edge {edge} connects node {node} to itself")]
    SelfLoop { edge: String, node: String },
    
    #[error("Invalid connection: {0}")]
    InvalidConnection(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Run not found: {0}")]
    RunNotFound(Uuid),
    
    #[error("No execution of node '{node_id}' in run {run_id}")]
    NodeExecutionNotFound { run_id: Uuid, node_id: String },
    
    #[error("{0}")]
    Backend(String),
}

impl From<StoreError> for NodeError {
    fn from(e: StoreError) -> Self {
        NodeError::RecordStore(e.to_string())
    }
}

use crate::{events::EventEmitter, NodeError, NodeId, NodeOutput, NodeSpec, NodeType, PortValues, RunId};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Core trait that all node handlers implement
#[async_trait]
pub trait Node: Send + Sync {
    /// Node type this handler executes
    fn node_type(&self) -> NodeType;
    
    /// Execute the node with given context
    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError>;
    
    /// Optional: description and port layout, for listings
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::default()
    }
}

/// Metadata about a node type
#[derive(Debug, Clone, Serialize)]
pub struct NodeMetadata {
    pub description: String,
    pub category: String,
    pub inputs: Vec<PortDefinition>,
    pub outputs: Vec<PortDefinition>,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PortDefinition {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl PortDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required,
        }
    }
}

/// Execution context passed to each node
#[derive(Clone)]
pub struct NodeContext {
    pub run_id: RunId,
    
    pub node_id: NodeId,
    
    pub node_type: NodeType,
    
    /// User-supplied parameters stored on the node
    pub data: PortValues,
    
    /// Values resolved from upstream outputs, keyed by input port
    pub inputs: PortValues,
    
    /// Event emitter for real-time updates
    pub events: EventEmitter,
}

impl NodeContext {
    pub fn new(run_id: RunId, node: &NodeSpec, inputs: PortValues, events: EventEmitter) -> Self {
        Self {
            run_id,
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            data: node.data.clone(),
            inputs,
            events,
        }
    }
    
    /// Parameter lookup where resolved inputs take precedence over node data
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name).or_else(|| self.data.get(name))
    }
    
    /// First non-empty textual parameter among `names`
    pub fn text_param(&self, names: &[&str]) -> Option<String> {
        names.iter()
            .filter_map(|name| self.param(name))
            .find_map(value_as_text)
    }
    
    /// Get a required textual parameter or return error
    pub fn require_text(&self, names: &[&str]) -> Result<String, NodeError> {
        self.text_param(names)
            .ok_or_else(|| NodeError::MissingInput(names.join(" / ")))
    }
}

/// Text form of a scalar value; empty strings count as absent.
pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

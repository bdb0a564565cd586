use loomcore::{Node, NodeContext, NodeError, NodeMetadata, NodeOutput, NodeType};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of node handlers, and the dispatcher that routes a node to one.
pub struct NodeRegistry {
    handlers: HashMap<NodeType, Arc<dyn Node>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
    
    /// Register a node handler, replacing any previous one for its type
    pub fn register(&mut self, handler: Arc<dyn Node>) {
        let node_type = handler.node_type();
        tracing::info!("Registering node type: {}", node_type);
        self.handlers.insert(node_type, handler);
    }
    
    pub fn get(&self, node_type: &NodeType) -> Option<&Arc<dyn Node>> {
        self.handlers.get(node_type)
    }
    
    /// Run the handler for the node's type.
    ///
    /// Input nodes without a handler pass their stored data through and
    /// never fail.
    pub async fn dispatch(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        if self.passes_through(&ctx.node_type) {
            return Ok(NodeOutput::from_input(&ctx.node_type, &ctx.data));
        }
        
        if let Some(handler) = self.handlers.get(&ctx.node_type) {
            return handler.execute(ctx).await;
        }
        
        Err(NodeError::Configuration(format!(
            "No handler registered for node type '{}'",
            ctx.node_type
        )))
    }
    
    /// Input nodes with no registered handler: their stored data is their output
    pub fn passes_through(&self, node_type: &NodeType) -> bool {
        node_type.is_input() && !self.handlers.contains_key(node_type)
    }
    
    /// Get all registered node types
    pub fn list_node_types(&self) -> Vec<NodeType> {
        let mut types: Vec<NodeType> = self.handlers.keys().cloned().collect();
        types.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        types
    }
    
    /// Get metadata for a node type
    pub fn get_metadata(&self, node_type: &NodeType) -> Option<NodeMetadata> {
        self.handlers.get(node_type).map(|h| h.metadata())
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

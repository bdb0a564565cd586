use crate::{PortValues, WorkflowError};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

pub type WorkflowId = Uuid;
pub type NodeId = String;

/// Kind of a node in the graph.
///
/// Both the engine names (`llm`, `image_upload`, ...) and the editor names
/// (`llmNode`, `imageUploadNode`, ...) are accepted. Unknown names are kept
/// as [`NodeType::Other`] and treated as input nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    Text,
    ImageUpload,
    VideoUpload,
    Llm,
    Crop,
    FrameExtract,
    Other(String),
}

impl NodeType {
    pub fn as_str(&self) -> &str {
        match self {
            NodeType::Text => "text",
            NodeType::ImageUpload => "image_upload",
            NodeType::VideoUpload => "video_upload",
            NodeType::Llm => "llm",
            NodeType::Crop => "crop",
            NodeType::FrameExtract => "frame_extract",
            NodeType::Other(name) => name,
        }
    }

    /// Input nodes carry user data and are never dispatched to a backend.
    pub fn is_input(&self) -> bool {
        !matches!(self, NodeType::Llm | NodeType::Crop | NodeType::FrameExtract)
    }
}

impl From<&str> for NodeType {
    fn from(s: &str) -> Self {
        match s {
            "text" | "textNode" => NodeType::Text,
            "image_upload" | "imageUploadNode" => NodeType::ImageUpload,
            "video_upload" | "videoUploadNode" => NodeType::VideoUpload,
            "llm" | "llmNode" => NodeType::Llm,
            "crop" | "cropNode" => NodeType::Crop,
            "frame_extract" | "frameExtractNode" => NodeType::FrameExtract,
            other => NodeType::Other(other.to_string()),
        }
    }
}

impl From<String> for NodeType {
    fn from(s: String) -> Self {
        NodeType::from(s.as_str())
    }
}

impl From<NodeType> for String {
    fn from(t: NodeType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workflow graph as submitted by the editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default = "Uuid::new_v4")]
    pub id: WorkflowId,
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_node(&mut self, node: NodeSpec) -> NodeId {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    pub fn connect(
        &mut self,
        source: impl Into<NodeId>,
        source_handle: impl Into<String>,
        target: impl Into<NodeId>,
        target_handle: impl Into<String>,
    ) {
        let source = source.into();
        let target = target.into();
        self.edges.push(Edge {
            id: format!("{}-{}-{}", source, target, self.edges.len()),
            source,
            source_handle: source_handle.into(),
            target,
            target_handle: target_handle.into(),
        });
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Check the structural rules a graph must satisfy before a run is created.
    ///
    /// Cycles spanning more than one node are left to the plan builder.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        validate_graph(&self.nodes, &self.edges)
    }
}

/// Rejects duplicate node ids, dangling edges, self-loops and edges that feed
/// an upload node into a port of the wrong media kind.
pub fn validate_graph(nodes: &[NodeSpec], edges: &[Edge]) -> Result<(), WorkflowError> {
    let mut ids = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !ids.insert(node.id.as_str()) {
            return Err(WorkflowError::DuplicateNode(node.id.clone()));
        }
    }

    for edge in edges {
        if edge.source == edge.target {
            return Err(WorkflowError::SelfLoop {
                edge: edge.id.clone(),
                node: edge.source.clone(),
            });
        }

        let source = nodes.iter().find(|n| n.id == edge.source)
            .ok_or_else(|| WorkflowError::NodeNotFound(edge.source.clone()))?;
        if !ids.contains(edge.target.as_str()) {
            return Err(WorkflowError::NodeNotFound(edge.target.clone()));
        }

        let allowed: &[&str] = match source.node_type {
            NodeType::VideoUpload => &["video_url"],
            NodeType::ImageUpload => &["image_url", "images"],
            _ => continue,
        };
        if !allowed.contains(&edge.target_handle.as_str()) {
            return Err(WorkflowError::InvalidConnection(format!(
                "{} output of '{}' cannot feed port '{}' of '{}'",
                source.node_type, edge.source, edge.target_handle, edge.target
            )));
        }
    }

    Ok(())
}

/// Node specification in a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub data: PortValues,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl NodeSpec {
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<NodeType>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            data: PortValues::new(),
            position: None,
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Some(Position { x, y });
        self
    }
}

/// Data-flow connection from an output port to an input port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub source: NodeId,
    #[serde(default = "default_source_handle", deserialize_with = "nullable")]
    pub source_handle: String,
    pub target: NodeId,
    #[serde(default, deserialize_with = "nullable")]
    pub target_handle: String,
}

fn default_source_handle() -> String {
    "output".to_string()
}

// The editor sends `null` for handles it never assigned.
fn nullable<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Node position in visual editor
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

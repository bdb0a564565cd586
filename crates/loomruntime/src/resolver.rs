use loomcore::{Edge, MediaKind, NodeId, NodeOutput, PortValues};
use serde_json::Value;
use std::collections::HashMap;

/// Outputs of the nodes that have finished so far in a run.
pub type OutputTable = HashMap<NodeId, NodeOutput>;

pub const IMAGE_URL: &str = "image_url";
pub const VIDEO_URL: &str = "video_url";
pub const SYSTEM_PROMPT: &str = "system_prompt";
pub const USER_MESSAGE: &str = "user_message";
/// Accumulates every incoming media reference instead of keeping the last one.
pub const IMAGES: &str = "images";

/// Gather the values flowing into `node_id`, keyed by target port.
///
/// Edges are applied in slice order, so when several edges feed the same
/// port the last one wins. Upstream nodes without an output are skipped.
pub fn resolve_inputs(node_id: &str, edges: &[Edge], outputs: &OutputTable) -> PortValues {
    let mut inputs = PortValues::new();

    for edge in edges.iter().filter(|e| e.target == node_id) {
        if edge.target_handle.is_empty() {
            continue;
        }

        let Some(upstream) = outputs.get(&edge.source) else {
            tracing::warn!(
                "No output from '{}' for port '{}' of '{}'",
                edge.source, edge.target_handle, node_id
            );
            continue;
        };

        if edge.target_handle == IMAGES {
            if let Some(url) = media_url(upstream) {
                let list = inputs
                    .entry(IMAGES)
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(urls) = list {
                    urls.push(Value::String(url));
                }
            }
            continue;
        }

        if let Some(value) = map_port(&edge.target_handle, upstream) {
            inputs.insert(edge.target_handle.clone(), value);
        }
    }

    inputs
}

/// The fixed port mapping table, evaluated over the output's shape.
fn map_port(port: &str, upstream: &NodeOutput) -> Option<Value> {
    match upstream {
        NodeOutput::Text { value } => Some(Value::String(value.clone())),

        NodeOutput::MediaRef { media, url } => match (port, media) {
            (IMAGE_URL, MediaKind::Image) | (VIDEO_URL, MediaKind::Video) => {
                Some(Value::String(url.clone()))
            }
            (SYSTEM_PROMPT | USER_MESSAGE, _) => None,
            _ => Some(upstream.as_object()),
        },

        NodeOutput::RawObject { fields } => match port {
            IMAGE_URL => Some(field(fields, &["imageUrl"]).unwrap_or_else(|| upstream.as_object())),
            VIDEO_URL => Some(field(fields, &["videoUrl"]).unwrap_or_else(|| upstream.as_object())),
            SYSTEM_PROMPT | USER_MESSAGE => field(fields, &["text", "output"]),
            _ => Some(upstream.as_object()),
        },
    }
}

fn field(fields: &PortValues, names: &[&str]) -> Option<Value> {
    names.iter()
        .filter_map(|name| fields.get(*name))
        .find(|value| is_truthy(value))
        .cloned()
}

fn media_url(upstream: &NodeOutput) -> Option<String> {
    let url = match upstream {
        NodeOutput::Text { value } => Some(value.clone()),
        NodeOutput::MediaRef { url, .. } => Some(url.clone()),
        NodeOutput::RawObject { fields } => field(fields, &["imageUrl", "outputUrl"])
            .and_then(|v| v.as_str().map(str::to_string)),
    };
    url.filter(|u| !u.is_empty())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

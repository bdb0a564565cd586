use crate::NodeType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Named port values: node data, resolved inputs, raw output fields.
pub type PortValues = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Field name the editor uses for a reference of this kind.
    pub fn field(self) -> &'static str {
        match self {
            MediaKind::Image => "imageUrl",
            MediaKind::Video => "videoUrl",
        }
    }
}

/// Output produced by a node, tagged by shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeOutput {
    Text { value: String },
    MediaRef { media: MediaKind, url: String },
    RawObject { fields: PortValues },
}

impl NodeOutput {
    pub fn text(value: impl Into<String>) -> Self {
        NodeOutput::Text { value: value.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        NodeOutput::MediaRef {
            media: MediaKind::Image,
            url: url.into(),
        }
    }

    pub fn video(url: impl Into<String>) -> Self {
        NodeOutput::MediaRef {
            media: MediaKind::Video,
            url: url.into(),
        }
    }

    /// Output of an input node: its stored data, tagged when the node type
    /// says what the data holds and the expected field is present.
    pub fn from_input(node_type: &NodeType, data: &PortValues) -> Self {
        let field = |name: &str| {
            data.get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let tagged = match node_type {
            NodeType::Text => data.get("text")
                .and_then(Value::as_str)
                .map(NodeOutput::text),
            NodeType::ImageUpload => field("imageUrl").map(NodeOutput::image),
            NodeType::VideoUpload => field("videoUrl").map(NodeOutput::video),
            _ => None,
        };

        tagged.unwrap_or_else(|| NodeOutput::RawObject {
            fields: data.clone(),
        })
    }

    /// Untagged object form, as the editor would have produced it.
    pub fn as_object(&self) -> Value {
        match self {
            NodeOutput::Text { value } => serde_json::json!({ "text": value }),
            NodeOutput::MediaRef { media, url } => {
                let mut fields = PortValues::new();
                fields.insert(media.field().to_string(), Value::String(url.clone()));
                Value::Object(fields)
            }
            NodeOutput::RawObject { fields } => Value::Object(fields.clone()),
        }
    }

    /// Output object written to a handler's node-execution record:
    /// `{output}` for text, `{outputUrl}` for media, raw fields as they are.
    ///
    /// Pass-through input nodes record their stored data instead.
    pub fn to_record(&self) -> Value {
        match self {
            NodeOutput::Text { value } => serde_json::json!({ "output": value }),
            NodeOutput::MediaRef { url, .. } => serde_json::json!({ "outputUrl": url }),
            NodeOutput::RawObject { fields } => Value::Object(fields.clone()),
        }
    }
}

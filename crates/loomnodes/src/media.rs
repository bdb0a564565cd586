use async_trait::async_trait;
use loomcore::{
    value_as_text, CropJob, CropPercent, FrameJob, MediaBackend, Node, NodeContext, NodeError,
    NodeMetadata, NodeOutput, NodeType, OutputTarget, PixelRect, PortDefinition, FRAME_WIDTH,
};
use serde_json::Value;
use std::sync::Arc;

/// Parse a percentage in `[0, 100]` from a number or numeric string.
pub fn parse_percent(value: Option<&Value>) -> Option<f64> {
    let pct = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (0.0..=100.0).contains(&pct).then_some(pct)
}

/// Crop region from the `*_percent` parameters. Unparseable values take
/// their defaults and a zero width or height counts as unset.
pub fn crop_percent(ctx: &NodeContext) -> CropPercent {
    let defaults = CropPercent::default();
    let extent = |name: &str, default: f64| {
        parse_percent(ctx.param(name))
            .filter(|pct| *pct > 0.0)
            .unwrap_or(default)
    };

    CropPercent {
        x: parse_percent(ctx.param("x_percent")).unwrap_or(defaults.x),
        y: parse_percent(ctx.param("y_percent")).unwrap_or(defaults.y),
        width: extent("width_percent", defaults.width),
        height: extent("height_percent", defaults.height),
    }
}

/// Position of the frame to grab.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timestamp {
    Seconds(f64),
    /// Share of the video's duration, `0..=100`.
    Percent(f64),
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::Seconds(1.0)
    }
}

impl Timestamp {
    /// Accepts seconds, `HH:MM:SS`, `MM:SS` and `N%`. Anything else is the
    /// default of one second in.
    pub fn parse(value: Option<&Value>) -> Self {
        let parsed = match value {
            Some(Value::Number(n)) => n.as_f64().filter(|s| *s >= 0.0).map(Timestamp::Seconds),
            Some(Value::String(s)) => Self::parse_str(s.trim()),
            _ => None,
        };
        parsed.unwrap_or_default()
    }

    fn parse_str(s: &str) -> Option<Self> {
        if let Some(pct) = s.strip_suffix('%') {
            let pct = pct.trim().parse::<f64>().ok()?;
            return (0.0..=100.0).contains(&pct).then_some(Timestamp::Percent(pct));
        }

        let fields: Vec<&str> = s.split(':').collect();
        if fields.len() > 3 {
            return None;
        }

        let mut seconds = 0.0;
        for field in fields {
            let part = field.parse::<f64>().ok().filter(|p| p.is_finite() && *p >= 0.0)?;
            seconds = seconds * 60.0 + part;
        }
        Some(Timestamp::Seconds(seconds))
    }

    /// Seconds into a video of the given duration.
    pub fn resolve(self, duration_secs: Option<f64>) -> Result<f64, NodeError> {
        match self {
            Timestamp::Seconds(s) => Ok(s),
            Timestamp::Percent(pct) => duration_secs
                .map(|d| d * pct / 100.0)
                .ok_or_else(|| {
                    NodeError::MediaProcessing(format!(
                        "Cannot seek to {}%: video duration unknown",
                        pct
                    ))
                }),
        }
    }

    fn needs_duration(self) -> bool {
        matches!(self, Timestamp::Percent(_))
    }
}

fn media_reference(ctx: &NodeContext, names: &[&str]) -> Result<String, NodeError> {
    names
        .iter()
        .filter_map(|name| ctx.param(name))
        .find_map(value_as_text)
        .ok_or_else(|| NodeError::MediaSourceNotFound(format!("no {} provided", names[0])))
}

fn target(ctx: &NodeContext) -> OutputTarget {
    OutputTarget {
        run_id: ctx.run_id,
        node_id: ctx.node_id.clone(),
    }
}

/// Crops an image to a percentage rectangle
pub struct CropNode {
    backend: Arc<dyn MediaBackend>,
}

impl CropNode {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Node for CropNode {
    fn node_type(&self) -> NodeType {
        NodeType::Crop
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let source = media_reference(&ctx, &["image_url", "imageUrl"])?;
        let percent = crop_percent(&ctx);

        let info = self.backend.probe(&source).await?;
        let rect = PixelRect::from_percent(&percent, info.width, info.height);
        ctx.events.info(format!(
            "Cropping {}x{} source to {}x{} at ({}, {})",
            info.width, info.height, rect.width, rect.height, rect.x, rect.y
        ));

        let url = self
            .backend
            .crop(CropJob {
                source,
                rect,
                target: target(&ctx),
            })
            .await?;

        Ok(NodeOutput::image(url))
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Crop an image by percentage".to_string(),
            category: "media".to_string(),
            inputs: vec![
                PortDefinition::new("image_url", "Image to crop", true),
                PortDefinition::new("x_percent", "Left edge, 0-100", false),
                PortDefinition::new("y_percent", "Top edge, 0-100", false),
                PortDefinition::new("width_percent", "Width, 0-100", false),
                PortDefinition::new("height_percent", "Height, 0-100", false),
            ],
            outputs: vec![PortDefinition::new("output", "Cropped image", true)],
        }
    }
}

/// Grabs a single still frame from a video
pub struct FrameExtractNode {
    backend: Arc<dyn MediaBackend>,
}

impl FrameExtractNode {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Node for FrameExtractNode {
    fn node_type(&self) -> NodeType {
        NodeType::FrameExtract
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let source = media_reference(&ctx, &["video_url", "videoUrl"])?;
        let timestamp = Timestamp::parse(ctx.param("timestamp"));

        let duration = if timestamp.needs_duration() {
            self.backend.probe(&source).await?.duration_secs
        } else {
            None
        };
        let at_seconds = timestamp.resolve(duration)?;
        ctx.events.info(format!("Extracting frame at {:.3}s", at_seconds));

        let url = self
            .backend
            .extract_frame(FrameJob {
                source,
                at_seconds,
                width: FRAME_WIDTH,
                target: target(&ctx),
            })
            .await?;

        Ok(NodeOutput::image(url))
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Extract a still frame from a video".to_string(),
            category: "media".to_string(),
            inputs: vec![
                PortDefinition::new("video_url", "Video to sample", true),
                PortDefinition::new("timestamp", "Seconds, HH:MM:SS or N%", false),
            ],
            outputs: vec![PortDefinition::new("output", "Extracted frame", true)],
        }
    }
}

//! Interfaces to the model-inference and media-processing backends.
//!
//! Timeouts on backend calls are the backend's own concern; the engine waits
//! for every call to return.

use crate::{NodeError, NodeId, RunId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Width every extracted frame is scaled to, aspect preserved.
pub const FRAME_WIDTH: u32 = 800;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub user_message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub text: String,
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Fails with [`NodeError::ModelInvocation`] on any non-success response
    /// and [`NodeError::Configuration`] when no credential is configured.
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, NodeError>;
}

/// Dimensions and length of a media source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub duration_secs: Option<f64>,
}

/// Crop region as percentages of the source dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropPercent {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for CropPercent {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
        }
    }
}

/// Crop region in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Each side is `round(pct / 100 * dimension)`; width and height are
    /// clipped so the rectangle stays inside the source.
    pub fn from_percent(crop: &CropPercent, width: u32, height: u32) -> Self {
        let scale = |pct: f64, dim: u32| ((pct / 100.0) * dim as f64).round() as u32;

        let x = scale(crop.x, width).min(width);
        let y = scale(crop.y, height).min(height);
        Self {
            x,
            y,
            width: scale(crop.width, width).min(width - x),
            height: scale(crop.height, height).min(height - y),
        }
    }
}

/// Identifies the run and node a produced file belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub run_id: RunId,
    pub node_id: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CropJob {
    pub source: String,
    pub rect: PixelRect,
    pub target: OutputTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameJob {
    pub source: String,
    pub at_seconds: f64,
    pub width: u32,
    pub target: OutputTarget,
}

/// Media operations. Every method fails with
/// [`NodeError::MediaSourceNotFound`] when the source cannot be resolved to
/// bytes and [`NodeError::MediaProcessing`] when processing fails.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn probe(&self, source: &str) -> Result<MediaInfo, NodeError>;

    /// Returns a reference to the cropped image.
    async fn crop(&self, job: CropJob) -> Result<String, NodeError>;

    /// Returns a reference to the extracted still frame.
    async fn extract_frame(&self, job: FrameJob) -> Result<String, NodeError>;
}

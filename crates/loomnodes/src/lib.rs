//! Built-in node handlers
//! 
//! The llm, crop and frame-extract handlers together with the HTTP model
//! backend and the ffmpeg media backend they run against.

mod config;
pub mod ffmpeg;
pub mod gemini;
mod llm;
mod media;
pub mod source;

pub use config::{NodesConfig, DEFAULT_MODEL_BASE_URL};
pub use ffmpeg::FfmpegMediaBackend;
pub use gemini::{effective_model, HttpModelBackend};
pub use llm::{build_request, LlmNode};
pub use media::{crop_percent, parse_percent, CropNode, FrameExtractNode, Timestamp};
use loomcore::{MediaBackend, ModelBackend};
use loomruntime::NodeRegistry;

use std::sync::Arc;

/// Register the built-in handlers against the given backends
pub fn register_with_backends(
    registry: &mut NodeRegistry,
    model: Arc<dyn ModelBackend>,
    media: Arc<dyn MediaBackend>,
) {
    registry.register(Arc::new(LlmNode::new(model)));
    registry.register(Arc::new(CropNode::new(media.clone())));
    registry.register(Arc::new(FrameExtractNode::new(media)));
}

/// Register all built-in handlers, backed by the HTTP model API and ffmpeg
pub fn register_all(registry: &mut NodeRegistry, config: &NodesConfig) {
    register_with_backends(
        registry,
        Arc::new(HttpModelBackend::new(config)),
        Arc::new(FfmpegMediaBackend::new(config)),
    );
}

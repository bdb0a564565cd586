use std::path::PathBuf;

pub const DEFAULT_MODEL_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Settings shared by the built-in node handlers and their backends
#[derive(Debug, Clone)]
pub struct NodesConfig {
    /// Directory local media references resolve against; produced files go
    /// to its `processed/` subdirectory.
    pub media_root: PathBuf,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub model_base_url: String,
    /// Model credential. Its absence only surfaces when an llm node runs.
    pub api_key: Option<String>,
}

impl Default for NodesConfig {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("./public"),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            model_base_url: DEFAULT_MODEL_BASE_URL.to_string(),
            api_key: None,
        }
    }
}

impl NodesConfig {
    pub fn with_media_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.media_root = root.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

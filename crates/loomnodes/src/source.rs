use loomcore::NodeError;
use std::path::{Component, Path, PathBuf};

/// A media reference resolved to something a backend can read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    Remote(String),
    Local(PathBuf),
}

impl MediaSource {
    /// Resolve `reference` against `media_root`.
    ///
    /// `http(s)://` URLs are taken as they are. Anything else is a path
    /// relative to the media root (a leading `/` is ignored) and must name an
    /// existing file.
    pub async fn locate(media_root: &Path, reference: &str) -> Result<Self, NodeError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(NodeError::MediaSourceNotFound("empty media reference".to_string()));
        }

        if is_remote(reference) {
            return Ok(MediaSource::Remote(reference.to_string()));
        }

        let relative = Path::new(reference.trim_start_matches('/'));
        if relative.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(NodeError::MediaSourceNotFound(format!(
                "{} escapes the media root",
                reference
            )));
        }

        let path = media_root.join(relative);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(MediaSource::Local(path)),
            _ => Err(NodeError::MediaSourceNotFound(reference.to_string())),
        }
    }

    /// Input argument for ffmpeg/ffprobe
    pub fn as_arg(&self) -> String {
        match self {
            MediaSource::Remote(url) => url.clone(),
            MediaSource::Local(path) => path.to_string_lossy().into_owned(),
        }
    }

    /// Read the whole source together with its MIME type.
    pub async fn load(&self, client: &reqwest::Client) -> Result<(Vec<u8>, String), NodeError> {
        match self {
            MediaSource::Local(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    NodeError::MediaSourceNotFound(format!("{}: {}", path.display(), e))
                })?;
                Ok((bytes, mime_for(&path.to_string_lossy()).to_string()))
            }
            MediaSource::Remote(url) => {
                let response = client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| NodeError::MediaSourceNotFound(format!("{}: {}", url, e)))?;

                if !response.status().is_success() {
                    return Err(NodeError::MediaSourceNotFound(format!(
                        "{}: HTTP {}",
                        url,
                        response.status()
                    )));
                }

                let mime = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .filter(|v| v.starts_with("image/"))
                    .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
                    .unwrap_or_else(|| mime_for(url).to_string());

                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| NodeError::MediaSourceNotFound(format!("{}: {}", url, e)))?;
                Ok((bytes.to_vec(), mime))
            }
        }
    }
}

pub fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// MIME type guessed from the file extension; JPEG when unknown.
pub fn mime_for(reference: &str) -> &'static str {
    let path = reference.split(['?', '#']).next().unwrap_or(reference);
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("heic") => "image/heic",
        _ => "image/jpeg",
    }
}


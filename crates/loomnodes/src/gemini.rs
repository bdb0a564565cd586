use crate::source::MediaSource;
use crate::NodesConfig;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use loomcore::{GenerateRequest, GenerateResponse, ModelBackend, NodeError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_MODEL: &str = "gemini-pro";
/// Substituted for the text-only default when images are attached.
pub const VISION_MODEL: &str = "gemini-1.5-flash";

/// Model backend speaking the `generateContent` REST API
pub struct HttpModelBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    media_root: PathBuf,
}

impl HttpModelBackend {
    pub fn new(config: &NodesConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.model_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            media_root: config.media_root.clone(),
        }
    }

    async fn image_part(&self, reference: &str) -> Result<Part, NodeError> {
        let source = MediaSource::locate(&self.media_root, reference).await?;
        let (bytes, mime_type) = source.load(&self.client).await?;
        Ok(Part::InlineData {
            inline_data: InlineData {
                mime_type,
                data: STANDARD.encode(bytes),
            },
        })
    }
}

/// The model actually called for a request.
pub fn effective_model(model: &str, has_images: bool) -> &str {
    match model {
        "" => DEFAULT_MODEL,
        DEFAULT_MODEL if has_images => VISION_MODEL,
        other => other,
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentBody {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentReply {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ReplyContent>,
}

#[derive(Debug, Deserialize)]
struct ReplyContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Debug, Deserialize)]
struct ReplyPart {
    text: Option<String>,
}

#[async_trait]
impl ModelBackend for HttpModelBackend {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, NodeError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| NodeError::Configuration("GEMINI_API_KEY is not set".to_string()))?;

        let model = effective_model(&request.model, !request.images.is_empty());

        let mut parts = Vec::with_capacity(request.images.len() + 2);
        if let Some(prompt) = request.system_prompt.as_deref().filter(|p| !p.is_empty()) {
            parts.push(Part::Text {
                text: format!("System Instruction: {}\n\n", prompt),
            });
        }
        for image in &request.images {
            parts.push(self.image_part(image).await?);
        }
        parts.push(Part::Text {
            text: request.user_message,
        });

        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        tracing::debug!("POST {} with {} part(s)", url, parts.len());

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&GenerateContentBody {
                contents: vec![Content { role: "user", parts }],
            })
            .send()
            .await
            .map_err(|e| NodeError::ModelInvocation(format!("Request to {} failed: {}", model, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NodeError::ModelInvocation(format!(
                "{} returned {}: {}",
                model,
                status,
                body.trim()
            )));
        }

        let reply: GenerateContentReply = response
            .json()
            .await
            .map_err(|e| NodeError::ModelInvocation(format!("Malformed response: {}", e)))?;

        let text = reply
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .ok_or_else(|| NodeError::ModelInvocation(format!("{} returned no candidates", model)))?;

        Ok(GenerateResponse { text })
    }
}

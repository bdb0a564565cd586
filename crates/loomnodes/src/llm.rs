use crate::gemini::DEFAULT_MODEL;
use async_trait::async_trait;
use loomcore::{
    value_as_text, GenerateRequest, ModelBackend, Node, NodeContext, NodeError, NodeMetadata,
    NodeOutput, NodeType, PortDefinition,
};
use serde_json::Value;
use std::sync::Arc;

/// Sends a prompt, and optionally images, to the model backend
pub struct LlmNode {
    backend: Arc<dyn ModelBackend>,
}

impl LlmNode {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }
}

/// Build the backend request from the node's merged parameters.
///
/// A prompt wired into the system port of a node with no user message is
/// moved over and used as the message.
pub fn build_request(ctx: &NodeContext) -> Result<GenerateRequest, NodeError> {
    let mut user_message = ctx
        .text_param(&["user_message", "userMessage"])
        .unwrap_or_default();
    let mut system_prompt = ctx.text_param(&["system_prompt", "systemPrompt"]);

    if user_message.is_empty() {
        if let Some(prompt) = system_prompt.take() {
            ctx.events.warn("No user message; using the system prompt as the message");
            user_message = prompt;
        }
    }

    if user_message.is_empty() {
        return Err(NodeError::MissingInput("user_message".to_string()));
    }

    Ok(GenerateRequest {
        model: ctx.text_param(&["model"]).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        system_prompt,
        user_message,
        images: ctx.param("images").map(image_list).unwrap_or_default(),
    })
}

fn image_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_as_text).collect(),
        other => value_as_text(other).into_iter().collect(),
    }
}

#[async_trait]
impl Node for LlmNode {
    fn node_type(&self) -> NodeType {
        NodeType::Llm
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let request = build_request(&ctx)?;

        ctx.events.info(format!(
            "Calling {} with {} image(s)",
            request.model,
            request.images.len()
        ));

        let response = self.backend.generate(request).await?;
        Ok(NodeOutput::text(response.text))
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Generate text with a language model".to_string(),
            category: "ai".to_string(),
            inputs: vec![
                PortDefinition::new("system_prompt", "Instruction prepended to the message", false),
                PortDefinition::new("user_message", "Prompt text", true),
                PortDefinition::new("images", "Image references sent with the prompt", false),
            ],
            outputs: vec![PortDefinition::new("output", "Generated text", true)],
        }
    }
}

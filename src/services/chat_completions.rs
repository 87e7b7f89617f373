//! Client for providers speaking the OpenAI-compatible chat-completions schema.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::internal::{ContextMessage, Role};
use crate::services::provider::{
    ensure_success, http_client, ChatProvider, ChatRequest, ProviderError,
};

pub const MAX_TOKENS: u32 = 4096;
pub const TEMPERATURE: f64 = 0.7;

#[derive(Clone)]
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ChatCompletionsClient {
    pub fn new(
        base_url: String,
        api_key: String,
        timeout: Duration,
        ssl_verify: bool,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(timeout, ssl_verify)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Converts the context into wire messages. An image is attached to the
    /// final message only, and only when that message comes from the user.
    pub fn build_messages(
        messages: &[ContextMessage],
        image_base64: Option<&str>,
    ) -> Vec<WireMessage> {
        let mut formatted: Vec<WireMessage> = messages
            .iter()
            .map(|m| WireMessage {
                role: m.role,
                content: WireContent::Text(m.content.clone()),
            })
            .collect();

        if let (Some(image), Some(last)) = (image_base64, formatted.last_mut()) {
            if last.role == Role::User {
                let text = match &last.content {
                    WireContent::Text(text) => text.clone(),
                    WireContent::Parts(_) => String::new(),
                };
                last.content = WireContent::Parts(vec![
                    ContentPart::Text { text },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: data_url(image),
                        },
                    },
                ]);
            }
        }

        formatted
    }
}

#[async_trait]
impl ChatProvider for ChatCompletionsClient {
    async fn complete(&self, request: ChatRequest<'_>) -> Result<String, ProviderError> {
        let body = ChatCompletionRequest {
            model: request.model_id,
            messages: Self::build_messages(request.messages, request.image_base64),
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = ensure_success(builder.send().await?).await?;
        let completion: ChatCompletionResponse = response.json().await?;

        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .unwrap_or_default())
    }
}

fn data_url(image: &str) -> String {
    if image.starts_with("data:") {
        image.to_string()
    } else {
        format!("data:image/png;base64,{}", image)
    }
}

// Request/Response Models
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: WireContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

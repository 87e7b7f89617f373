//! Client for endpoints taking a flat `{model, prompt, system_prompt}` payload.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::models::internal::Role;
use crate::services::chat_completions::TEMPERATURE;
use crate::services::provider::{
    ensure_success, http_client, ChatProvider, ChatRequest, ProviderError,
};

#[derive(Clone)]
pub struct RawHttpClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    default_system_prompt: String,
}

#[derive(Debug, Serialize)]
struct RawPrompt<'a> {
    model: &'a str,
    prompt: &'a str,
    system_prompt: &'a str,
    temperature: f64,
}

impl RawHttpClient {
    pub fn new(
        endpoint: String,
        api_key: String,
        default_system_prompt: String,
        timeout: Duration,
        ssl_verify: bool,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(timeout, ssl_verify)?,
            endpoint,
            api_key,
            default_system_prompt,
        })
    }
}

#[async_trait]
impl ChatProvider for RawHttpClient {
    async fn complete(&self, request: ChatRequest<'_>) -> Result<String, ProviderError> {
        let prompt = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let system_prompt = request
            .messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .unwrap_or(&self.default_system_prompt);

        let payload = RawPrompt {
            model: request.model_id,
            prompt,
            system_prompt,
            temperature: TEMPERATURE,
        };

        let mut builder = self.client.post(&self.endpoint).json(&payload);
        // Keyless endpoints get no Authorization header rather than `Bearer `.
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = ensure_success(builder.send().await?).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(extract_reply(&body))
    }
}

/// Pulls the reply out of a loosely shaped JSON body. Tries `response`,
/// `text`, `choices[0].message.content` and `choices[0].text` in that
/// order, and falls back to the whole body pretty-printed.
pub fn extract_reply(body: &Value) -> String {
    if let Some(value) = body.get("response").or_else(|| body.get("text")) {
        return as_text(value);
    }

    if let Some(choice) = body
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
    {
        if let Some(content) = choice.get("message").and_then(|m| m.get("content")) {
            return as_text(content);
        }
        if let Some(text) = choice.get("text") {
            return as_text(text);
        }
    }

    serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string())
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

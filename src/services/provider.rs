use async_trait::async_trait;
use std::time::Duration;

use crate::models::internal::ContextMessage;

/// Provider-specific errors
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// One normalized completion request, whatever the wire format.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    /// Model id as the provider knows it
    pub model_id: &'a str,
    pub messages: &'a [ContextMessage],
    pub image_base64: Option<&'a str>,
}

/// A model-serving endpoint reachable over one wire contract.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, request: ChatRequest<'_>) -> Result<String, ProviderError>;
}

pub(crate) fn http_client(timeout: Duration, ssl_verify: bool) -> Result<reqwest::Client, ProviderError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(!ssl_verify)
        .build()?;
    Ok(client)
}

/// Turns a non-2xx response into `ProviderError::ApiError`.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }

    Err(ProviderError::ApiError {
        status: response.status().as_u16(),
        message: response.text().await.unwrap_or_default(),
    })
}

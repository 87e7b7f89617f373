use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::Config;
use crate::models::internal::{ContextMessage, Role};
use crate::services::chat_completions::ChatCompletionsClient;
use crate::services::provider::{ChatProvider, ChatRequest, ProviderError};
use crate::services::raw_http::RawHttpClient;
use crate::services::registry::{build_registry, AvailableModel, ModelEntry, ProviderKind};

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("Unknown model '{requested}'. Available: {}", available.join(", "))]
    UnknownModel {
        requested: String,
        available: Vec<String>,
    },
}

/// Result of a dispatch. Every variant carries the text that becomes the
/// assistant reply, so callers never have to handle a raised fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed { model: String, text: String },
    /// Credentials for the provider are not configured
    Echo { model: String, text: String },
    UnknownModel { requested: String, text: String },
    ProviderFailed { model: String, text: String },
}

impl DispatchOutcome {
    pub fn text(&self) -> &str {
        match self {
            DispatchOutcome::Completed { text, .. }
            | DispatchOutcome::Echo { text, .. }
            | DispatchOutcome::UnknownModel { text, .. }
            | DispatchOutcome::ProviderFailed { text, .. } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            DispatchOutcome::Completed { text, .. }
            | DispatchOutcome::Echo { text, .. }
            | DispatchOutcome::UnknownModel { text, .. }
            | DispatchOutcome::ProviderFailed { text, .. } => text,
        }
    }
}

/// Looks `model_name` up in the registry built from `config`, falling back
/// to the configured default model.
pub fn resolve(config: &Config, model_name: Option<&str>) -> Result<ModelEntry, RouterError> {
    let requested = model_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(&config.default_model);

    let registry = build_registry(config);
    registry
        .get(requested)
        .cloned()
        .ok_or_else(|| RouterError::UnknownModel {
            requested: requested.to_string(),
            available: registry.ids().into_iter().map(str::to_string).collect(),
        })
}

/// Deterministic reply used when a provider has no credentials.
pub fn echo_reply(model: &str, messages: &[ContextMessage]) -> String {
    let last_user = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    format!(
        "**[Demo Mode: {model}]**\n\n\
         API key not configured. Here's an echo of your message:\n\n\
         > {last_user}\n\n\
         To enable real AI responses, add your API key to the configuration."
    )
}

/// Routes assembled context to the provider serving the requested model.
#[derive(Clone)]
pub struct ModelRouter {
    config: Arc<RwLock<Config>>,
}

impl ModelRouter {
    pub fn new(config: Arc<RwLock<Config>>) -> Self {
        Self { config }
    }

    pub async fn available_models(&self) -> Vec<AvailableModel> {
        let config = self.config.read().await;
        build_registry(&config).available_models()
    }

    pub async fn resolve(&self, model_name: Option<&str>) -> Result<ModelEntry, RouterError> {
        let config = self.config.read().await;
        resolve(&config, model_name)
    }

    pub async fn dispatch(
        &self,
        messages: &[ContextMessage],
        model_name: Option<&str>,
        image_base64: Option<&str>,
    ) -> DispatchOutcome {
        // The provider call must not hold the config lock.
        let config = self.config.read().await.clone();

        let entry = match resolve(&config, model_name) {
            Ok(entry) => entry,
            Err(e) => {
                let RouterError::UnknownModel { requested, .. } = &e;
                warn!(model = %requested, "Dispatch to unknown model");
                return DispatchOutcome::UnknownModel {
                    requested: requested.clone(),
                    text: format!("Error: {}", e),
                };
            }
        };

        let (_, api_key) = endpoint_for(&config, entry.provider);
        if entry.provider.requires_credentials() && api_key.trim().is_empty() {
            info!(model = %entry.id, provider = entry.provider.as_str(), "No credentials, replying with echo");
            return DispatchOutcome::Echo {
                text: echo_reply(&entry.id, messages),
                model: entry.id,
            };
        }

        let result = match provider_for(&config, &entry) {
            Ok(provider) => {
                provider
                    .complete(ChatRequest {
                        model_id: &entry.provider_model_id,
                        messages,
                        image_base64,
                    })
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(text) => DispatchOutcome::Completed {
                model: entry.id,
                text,
            },
            Err(e) => {
                warn!(model = %entry.id, provider = entry.provider.as_str(), "Provider call failed: {}", e);
                DispatchOutcome::ProviderFailed {
                    text: format!("Error communicating with {}: {}", entry.id, e),
                    model: entry.id,
                }
            }
        }
    }
}

fn endpoint_for(config: &Config, provider: ProviderKind) -> (&str, &str) {
    match provider {
        ProviderKind::OpenAi => (config.openai_base_url.as_str(), config.openai_api_key.as_str()),
        ProviderKind::DeepSeek => (
            config.deepseek_base_url.as_str(),
            config.deepseek_api_key.as_str(),
        ),
        ProviderKind::Competition | ProviderKind::CompetitionRaw => (
            config.competition_base_url.as_str(),
            config.competition_api_key.as_str(),
        ),
    }
}

fn provider_for(config: &Config, entry: &ModelEntry) -> Result<Box<dyn ChatProvider>, ProviderError> {
    let (base_url, api_key) = endpoint_for(config, entry.provider);

    let provider: Box<dyn ChatProvider> = match entry.provider {
        ProviderKind::CompetitionRaw => Box::new(RawHttpClient::new(
            base_url.to_string(),
            api_key.to_string(),
            config.system_prompt.clone(),
            Duration::from_secs(config.raw_http_timeout_secs),
            config.ssl_verify,
        )?),
        ProviderKind::OpenAi | ProviderKind::DeepSeek | ProviderKind::Competition => {
            Box::new(ChatCompletionsClient::new(
                base_url.to_string(),
                api_key.to_string(),
                Duration::from_secs(config.request_timeout_secs),
                config.ssl_verify,
            )?)
        }
    };
    Ok(provider)
}

use serde::Serialize;
use utoipa::ToSchema;

use crate::config::Config;

/// Model id registered when a competition endpoint is configured without ids.
pub const SYNTHETIC_COMPETITION_ID: &str = "competition-model";
const SYNTHETIC_PROVIDER_MODEL_ID: &str = "custom";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    DeepSeek,
    /// Competition endpoint speaking chat-completions
    Competition,
    /// Competition endpoint taking the flat raw-HTTP payload
    CompetitionRaw,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Competition => "competition",
            ProviderKind::CompetitionRaw => "competition_raw",
        }
    }

    pub fn requires_credentials(&self) -> bool {
        matches!(self, ProviderKind::OpenAi | ProviderKind::DeepSeek)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    pub id: String,
    pub provider: ProviderKind,
    pub provider_model_id: String,
    pub supports_vision: bool,
}

impl ModelEntry {
    fn new(id: &str, provider: ProviderKind, provider_model_id: &str, supports_vision: bool) -> Self {
        Self {
            id: id.to_string(),
            provider,
            provider_model_id: provider_model_id.to_string(),
            supports_vision,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AvailableModel {
    pub id: String,
    pub name: String,
    pub vision: bool,
}

/// Resolved mapping of model id to routing info, in registration order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<ModelEntry>,
}

impl Registry {
    pub fn get(&self, id: &str) -> Option<&ModelEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.id.as_str()).collect()
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn available_models(&self) -> Vec<AvailableModel> {
        self.entries
            .iter()
            .map(|entry| AvailableModel {
                id: entry.id.clone(),
                name: entry.id.clone(),
                vision: entry.supports_vision,
            })
            .collect()
    }

    // Re-registering an id replaces the entry where it already stands.
    fn insert(&mut self, entry: ModelEntry) {
        match self.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }
}

/// Builds the registry from a configuration snapshot: the built-in
/// OpenAI and DeepSeek models followed by the competition models.
pub fn build_registry(config: &Config) -> Registry {
    let mut registry = Registry::default();

    registry.insert(ModelEntry::new("gpt-4o", ProviderKind::OpenAi, "gpt-4o", true));
    registry.insert(ModelEntry::new("gpt-4o-mini", ProviderKind::OpenAi, "gpt-4o-mini", true));
    registry.insert(ModelEntry::new("deepseek-chat", ProviderKind::DeepSeek, "deepseek-chat", false));
    registry.insert(ModelEntry::new(
        "deepseek-reasoner",
        ProviderKind::DeepSeek,
        "deepseek-reasoner",
        false,
    ));

    let competition = if config.competition_use_raw_http {
        ProviderKind::CompetitionRaw
    } else {
        ProviderKind::Competition
    };

    let ids = config.competition_ids();
    if !ids.is_empty() {
        for id in ids {
            registry.insert(ModelEntry::new(&id, competition, &id, true));
        }
    } else if !config.competition_base_url.trim().is_empty() {
        registry.insert(ModelEntry::new(
            SYNTHETIC_COMPETITION_ID,
            competition,
            SYNTHETIC_PROVIDER_MODEL_ID,
            true,
        ));
    }

    registry
}

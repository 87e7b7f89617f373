use chrono::{DateTime, Utc};
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Title every new session starts with until its first turn renames it.
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// Stored in place of image bytes; only the presence of an image is retained.
pub const IMAGE_MARKER: &str = "[image attached]";

pub const CATEGORY_AUTO_EXTRACTED: &str = "auto-extracted";
pub const CATEGORY_GENERAL: &str = "general";
pub const CATEGORY_MANUAL: &str = "manual";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[sea_orm(string_value = "user")]
    User,
    #[sea_orm(string_value = "assistant")]
    Assistant,
    #[sea_orm(string_value = "system")]
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    pub provider: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: Role,
    pub content: String,
    pub image_url: Option<String>,
    /// Zero-based place of the message in its session.
    pub position: i64,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub image_url: Option<String>,
}

impl NewMessage {
    pub fn user(content: impl Into<String>, has_image: bool) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            image_url: has_image.then(|| IMAGE_MARKER.to_string()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            image_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryFact {
    pub id: i64,
    pub user_id: Uuid,
    pub key: String,
    pub value: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

/// A single entry of the conversation handed to a model provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
}

impl ContextMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&Message> for ContextMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactView {
    pub key: String,
    pub value: String,
    pub category: String,
}

impl From<MemoryFact> for FactView {
    fn from(fact: MemoryFact) -> Self {
        Self {
            key: fact.key,
            value: fact.value,
            category: fact.category,
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::internal::{ChatSession, MemoryFact, Message, Role, User, CATEGORY_GENERAL};

// ==================== REQUEST DTOs ====================

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct DemoLoginRequest {
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base64 image, with or without a `data:` prefix
    #[serde(default)]
    pub image_base64: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UploadDocumentRequest {
    pub filename: String,
    pub content_base64: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CreateMemoryRequest {
    pub key: String,
    pub value: String,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    CATEGORY_GENERAL.to_string()
}

// ==================== RESPONSE DTOs ====================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub name: String,
    pub description: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            provider: user.provider,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ChatSession> for SessionResponse {
    fn from(session: ChatSession) -> Self {
        Self {
            id: session.id,
            title: session.title,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: Role,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            session_id: message.session_id,
            role: message.role,
            content: message.content,
            image_url: message.image_url,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SendMessageResponse {
    pub user_message: MessageResponse,
    pub assistant_message: MessageResponse,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadDocumentResponse {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MemoryResponse {
    pub id: i64,
    pub key: String,
    pub value: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

impl From<MemoryFact> for MemoryResponse {
    fn from(fact: MemoryFact) -> Self {
        Self {
            id: fact.id,
            key: fact.key,
            value: fact.value,
            category: fact.category,
            created_at: fact.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteMemoriesResponse {
    pub deleted: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u32,
}

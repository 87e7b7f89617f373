//! Assistant Core - conversational assistant backend with long-term memory

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod storage;

// Re-export main types for convenience
pub use crate::api::dto::*;
pub use crate::api::routes::{create_router, AppState};
pub use crate::config::Config;
pub use crate::models::internal::{ChatSession, ContextMessage, MemoryFact, Message, NewMessage, Role, User};
pub use crate::orchestrator::{ChatOrchestrator, OrchestratorError, TurnOutcome};
pub use crate::services::model_router::{DispatchOutcome, ModelRouter};
pub use crate::storage::db::init_db;
pub use crate::storage::repository::{ChatRepository, SeaOrmChatRepository};

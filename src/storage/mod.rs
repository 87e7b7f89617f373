pub mod db;
pub mod entities;
pub mod migration;
pub mod repository;

pub use db::init_db;
pub use entities::{chat_sessions, memory_facts, messages, users};
pub use repository::{ChatRepository, RepositoryError, SeaOrmChatRepository};

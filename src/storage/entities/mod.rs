pub mod chat_sessions;
pub mod memory_facts;
pub mod messages;
pub mod users;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    prelude::*, ActiveValue::NotSet, DatabaseTransaction, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::models::internal::{
    ChatSession, MemoryFact, Message, NewMessage, NewUser, User, CATEGORY_AUTO_EXTRACTED,
    DEFAULT_SESSION_TITLE,
};
use crate::storage::entities::{chat_sessions, memory_facts, messages, users};

/// Upper bound on facts fed into a prompt.
pub const LONG_TERM_LIMIT: u64 = 50;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DbError(#[from] sea_orm::DbErr),
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Storage contract of the assistant. Every query that touches user data is
/// scoped by the owning user id; a lookup with the wrong owner behaves like a
/// missing row.
#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError>;
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    async fn get_or_create_user(&self, user: NewUser) -> Result<User, RepositoryError>;
    /// Removes the user with every session, message and memory fact it owns.
    async fn delete_user(&self, id: Uuid) -> Result<bool, RepositoryError>;

    async fn create_session(
        &self,
        user_id: Uuid,
        title: Option<String>,
    ) -> Result<ChatSession, RepositoryError>;
    async fn find_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ChatSession>, RepositoryError>;
    /// Most recently updated first.
    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<ChatSession>, RepositoryError>;
    async fn delete_session(&self, session_id: Uuid, user_id: Uuid)
        -> Result<bool, RepositoryError>;

    /// Appends a message and bumps the session's `updated_at` in one
    /// transaction. When `auto_title` is given and the session still carries
    /// the placeholder title, the title is replaced in the same transaction.
    async fn append_message(
        &self,
        session_id: Uuid,
        message: NewMessage,
        auto_title: Option<String>,
    ) -> Result<Message, RepositoryError>;
    /// Oldest first.
    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<Message>, RepositoryError>;
    /// Newest first, at most `limit` entries.
    async fn recent_messages(
        &self,
        session_id: Uuid,
        limit: u64,
    ) -> Result<Vec<Message>, RepositoryError>;

    /// Newest first; `None` lists everything.
    async fn list_memories(
        &self,
        user_id: Uuid,
        limit: Option<u64>,
    ) -> Result<Vec<MemoryFact>, RepositoryError>;
    async fn find_memory(
        &self,
        user_id: Uuid,
        key: &str,
    ) -> Result<Option<MemoryFact>, RepositoryError>;
    /// Plain insert, no per-key check.
    async fn save_memory(
        &self,
        user_id: Uuid,
        key: &str,
        value: &str,
        category: &str,
    ) -> Result<MemoryFact, RepositoryError>;
    /// Overwrites the value of an existing key or inserts an
    /// `auto-extracted` fact. All pairs commit together.
    async fn upsert_memories(
        &self,
        user_id: Uuid,
        facts: Vec<(String, String)>,
    ) -> Result<(), RepositoryError>;
    async fn delete_memories(&self, user_id: Uuid) -> Result<u64, RepositoryError>;
}

pub struct SeaOrmChatRepository {
    db: DatabaseConnection,
}

impl SeaOrmChatRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn next_position(
        txn: &DatabaseTransaction,
        session_id: Uuid,
    ) -> Result<i64, RepositoryError> {
        let last = messages::Entity::find()
            .filter(messages::Column::SessionId.eq(session_id))
            .order_by_desc(messages::Column::Position)
            .one(txn)
            .await?;

        Ok(last.map(|m| m.position + 1).unwrap_or(0))
    }
}

#[async_trait]
impl ChatRepository for SeaOrmChatRepository {
    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        if user.email.trim().is_empty() {
            return Err(RepositoryError::InvalidInput("email is empty".to_string()));
        }

        let model = users::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(user.email),
            display_name: Set(user.display_name),
            provider: Set(user.provider),
            created_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await?;

        tracing::info!("Created user: {}", model.id);
        Ok(User::from(model))
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let model = users::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let model = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.db)
            .await?;
        Ok(model.map(User::from))
    }

    async fn get_or_create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        if let Some(existing) = self.find_user_by_email(&user.email).await? {
            return Ok(existing);
        }
        self.create_user(user).await
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let txn = self.db.begin().await?;

        let session_ids: Vec<Uuid> = chat_sessions::Entity::find()
            .select_only()
            .column(chat_sessions::Column::Id)
            .filter(chat_sessions::Column::UserId.eq(id))
            .into_tuple::<Uuid>()
            .all(&txn)
            .await?;

        if !session_ids.is_empty() {
            messages::Entity::delete_many()
                .filter(messages::Column::SessionId.is_in(session_ids))
                .exec(&txn)
                .await?;
        }
        chat_sessions::Entity::delete_many()
            .filter(chat_sessions::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        memory_facts::Entity::delete_many()
            .filter(memory_facts::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        let result = users::Entity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;
        Ok(result.rows_affected > 0)
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        title: Option<String>,
    ) -> Result<ChatSession, RepositoryError> {
        if self.find_user(user_id).await?.is_none() {
            return Err(RepositoryError::NotFound(format!("User {}", user_id)));
        }

        let now = Utc::now();
        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string());

        let model = chat_sessions::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            title: Set(title),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;

        tracing::info!("Created session: {}", model.id);
        Ok(ChatSession::from(model))
    }

    async fn find_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ChatSession>, RepositoryError> {
        let model = chat_sessions::Entity::find_by_id(session_id)
            .filter(chat_sessions::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?;
        Ok(model.map(ChatSession::from))
    }

    async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<ChatSession>, RepositoryError> {
        let models = chat_sessions::Entity::find()
            .filter(chat_sessions::Column::UserId.eq(user_id))
            .order_by_desc(chat_sessions::Column::UpdatedAt)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(ChatSession::from).collect())
    }

    async fn delete_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, RepositoryError> {
        let txn = self.db.begin().await?;

        let owned = chat_sessions::Entity::find_by_id(session_id)
            .filter(chat_sessions::Column::UserId.eq(user_id))
            .one(&txn)
            .await?;
        if owned.is_none() {
            return Ok(false);
        }

        messages::Entity::delete_many()
            .filter(messages::Column::SessionId.eq(session_id))
            .exec(&txn)
            .await?;
        chat_sessions::Entity::delete_by_id(session_id)
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(true)
    }

    async fn append_message(
        &self,
        session_id: Uuid,
        message: NewMessage,
        auto_title: Option<String>,
    ) -> Result<Message, RepositoryError> {
        let txn = self.db.begin().await?;

        let session = chat_sessions::Entity::find_by_id(session_id)
            .one(&txn)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("Session {}", session_id)))?;

        let now = Utc::now();
        let position = Self::next_position(&txn, session_id).await?;

        let inserted = messages::ActiveModel {
            id: Set(Uuid::new_v4()),
            session_id: Set(session_id),
            role: Set(message.role),
            content: Set(message.content),
            image_url: Set(message.image_url),
            position: Set(position),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let retitle = auto_title.filter(|_| session.title == DEFAULT_SESSION_TITLE);
        let mut active: chat_sessions::ActiveModel = session.into();
        active.updated_at = Set(now);
        if let Some(title) = retitle {
            active.title = Set(title);
        }
        active.update(&txn).await?;

        txn.commit().await?;
        tracing::debug!("Stored message {} at position {}", inserted.id, position);

        Ok(Message::from(inserted))
    }

    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<Message>, RepositoryError> {
        let models = messages::Entity::find()
            .filter(messages::Column::SessionId.eq(session_id))
            .order_by_asc(messages::Column::Position)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Message::from).collect())
    }

    async fn recent_messages(
        &self,
        session_id: Uuid,
        limit: u64,
    ) -> Result<Vec<Message>, RepositoryError> {
        let models = messages::Entity::find()
            .filter(messages::Column::SessionId.eq(session_id))
            .order_by_desc(messages::Column::Position)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Message::from).collect())
    }

    async fn list_memories(
        &self,
        user_id: Uuid,
        limit: Option<u64>,
    ) -> Result<Vec<MemoryFact>, RepositoryError> {
        let mut query = memory_facts::Entity::find()
            .filter(memory_facts::Column::UserId.eq(user_id))
            .order_by_desc(memory_facts::Column::CreatedAt)
            .order_by_desc(memory_facts::Column::Id);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        let models = query.all(&self.db).await?;
        Ok(models.into_iter().map(MemoryFact::from).collect())
    }

    async fn find_memory(
        &self,
        user_id: Uuid,
        key: &str,
    ) -> Result<Option<MemoryFact>, RepositoryError> {
        let model = memory_facts::Entity::find()
            .filter(memory_facts::Column::UserId.eq(user_id))
            .filter(memory_facts::Column::Key.eq(key))
            .order_by_asc(memory_facts::Column::Id)
            .one(&self.db)
            .await?;
        Ok(model.map(MemoryFact::from))
    }

    async fn save_memory(
        &self,
        user_id: Uuid,
        key: &str,
        value: &str,
        category: &str,
    ) -> Result<MemoryFact, RepositoryError> {
        if key.trim().is_empty() {
            return Err(RepositoryError::InvalidInput("memory key is empty".to_string()));
        }

        let model = memory_facts::ActiveModel {
            id: NotSet,
            user_id: Set(user_id),
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            category: Set(category.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await?;

        Ok(MemoryFact::from(model))
    }

    async fn upsert_memories(
        &self,
        user_id: Uuid,
        facts: Vec<(String, String)>,
    ) -> Result<(), RepositoryError> {
        if facts.is_empty() {
            return Ok(());
        }

        let txn = self.db.begin().await?;

        for (key, value) in facts {
            let existing = memory_facts::Entity::find()
                .filter(memory_facts::Column::UserId.eq(user_id))
                .filter(memory_facts::Column::Key.eq(key.as_str()))
                .order_by_asc(memory_facts::Column::Id)
                .one(&txn)
                .await?;

            match existing {
                Some(model) => {
                    let mut active: memory_facts::ActiveModel = model.into();
                    active.value = Set(value);
                    active.update(&txn).await?;
                }
                None => {
                    memory_facts::ActiveModel {
                        id: NotSet,
                        user_id: Set(user_id),
                        key: Set(key),
                        value: Set(value),
                        category: Set(CATEGORY_AUTO_EXTRACTED.to_string()),
                        created_at: Set(Utc::now()),
                    }
                    .insert(&txn)
                    .await?;
                }
            }
        }

        txn.commit().await?;
        Ok(())
    }

    async fn delete_memories(&self, user_id: Uuid) -> Result<u64, RepositoryError> {
        let result = memory_facts::Entity::delete_many()
            .filter(memory_facts::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

// ============================================
// Conversions
// ============================================

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            display_name: model.display_name,
            provider: model.provider,
            created_at: model.created_at,
        }
    }
}

impl From<chat_sessions::Model> for ChatSession {
    fn from(model: chat_sessions::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            title: model.title,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<messages::Model> for Message {
    fn from(model: messages::Model) -> Self {
        Self {
            id: model.id,
            session_id: model.session_id,
            role: model.role,
            content: model.content,
            image_url: model.image_url,
            position: model.position,
            created_at: model.created_at,
        }
    }
}

impl From<memory_facts::Model> for MemoryFact {
    fn from(model: memory_facts::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            key: model.key,
            value: model.value,
            category: model.category,
            created_at: model.created_at,
        }
    }
}

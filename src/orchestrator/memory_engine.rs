use std::sync::Arc;
use uuid::Uuid;

use crate::models::internal::{ContextMessage, FactView, MemoryFact};
use crate::orchestrator::fact_extraction::FactExtractor;
use crate::storage::repository::{ChatRepository, RepositoryError, LONG_TERM_LIMIT};

const MEMORY_HEADER: &str = "Here are some things you know about this user:";

/// Short-term (session window) and long-term (per-user facts) memory.
pub struct MemoryEngine {
    repo: Arc<dyn ChatRepository>,
    extractor: FactExtractor,
}

impl MemoryEngine {
    pub fn new(repo: Arc<dyn ChatRepository>) -> Self {
        Self::with_extractor(repo, FactExtractor::default())
    }

    pub fn with_extractor(repo: Arc<dyn ChatRepository>, extractor: FactExtractor) -> Self {
        Self { repo, extractor }
    }

    /// The last `window_size` messages of the session, oldest first.
    pub async fn short_term_context(
        &self,
        session_id: Uuid,
        window_size: u64,
    ) -> Result<Vec<ContextMessage>, RepositoryError> {
        let mut recent = self.repo.recent_messages(session_id, window_size).await?;
        recent.reverse();
        Ok(recent.iter().map(ContextMessage::from).collect())
    }

    /// Up to 50 facts, newest first.
    pub async fn long_term_context(&self, user_id: Uuid) -> Result<Vec<FactView>, RepositoryError> {
        let facts = self
            .repo
            .list_memories(user_id, Some(LONG_TERM_LIMIT))
            .await?;
        Ok(facts.into_iter().map(FactView::from).collect())
    }

    /// Renders facts as a header line plus one bullet per fact; empty input
    /// renders as an empty string.
    pub fn format_context(facts: &[FactView]) -> String {
        if facts.is_empty() {
            return String::new();
        }

        let mut lines = Vec::with_capacity(facts.len() + 1);
        lines.push(MEMORY_HEADER.to_string());
        for fact in facts {
            lines.push(format!("- {}: {}", fact.key, single_line(&fact.value)));
        }
        lines.join("\n")
    }

    /// Parses `raw_text` for facts and stores them, overwriting existing
    /// keys. Returns the number of facts written.
    pub async fn extract_and_store(
        &self,
        user_id: Uuid,
        raw_text: &str,
    ) -> Result<usize, RepositoryError> {
        let facts: Vec<(String, String)> = self
            .extractor
            .extract(raw_text)
            .into_iter()
            .map(|fact| (fact.key, fact.value))
            .collect();

        let count = facts.len();
        if count > 0 {
            self.repo.upsert_memories(user_id, facts).await?;
            tracing::debug!(%user_id, count, "Stored extracted facts");
        }
        Ok(count)
    }

    pub async fn save_memory(
        &self,
        user_id: Uuid,
        key: &str,
        value: &str,
        category: &str,
    ) -> Result<MemoryFact, RepositoryError> {
        self.repo.save_memory(user_id, key, value, category).await
    }

    /// Every fact of the user, newest first, without the prompt cap.
    pub async fn list_all(&self, user_id: Uuid) -> Result<Vec<MemoryFact>, RepositoryError> {
        self.repo.list_memories(user_id, None).await
    }

    pub async fn delete_all(&self, user_id: Uuid) -> Result<u64, RepositoryError> {
        self.repo.delete_memories(user_id).await
    }
}

// Keeps the bullet count equal to the fact count.
fn single_line(value: &str) -> String {
    value.lines().map(str::trim).collect::<Vec<_>>().join(" ")
}

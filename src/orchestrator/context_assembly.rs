use std::sync::Arc;
use uuid::Uuid;

use crate::models::internal::{ContextMessage, Role};
use crate::orchestrator::memory_engine::MemoryEngine;
use crate::storage::repository::RepositoryError;

pub const TITLE_MAX_CHARS: usize = 60;
const TITLE_ELLIPSIS: &str = "...";

/// Builds the message list sent to the model on every turn.
pub struct ContextAssembler {
    memory: Arc<MemoryEngine>,
}

impl ContextAssembler {
    pub fn new(memory: Arc<MemoryEngine>) -> Self {
        Self { memory }
    }

    /// System message (base prompt plus long-term memory) followed by the
    /// session's short-term window, oldest first.
    pub async fn assemble(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        base_prompt: &str,
        window_size: u64,
    ) -> Result<Vec<ContextMessage>, RepositoryError> {
        // Phase 1: Long-term recall
        let facts = self.memory.long_term_context(user_id).await?;
        let memory_block = MemoryEngine::format_context(&facts);

        // Phase 2: Short-term window
        let window = self
            .memory
            .short_term_context(session_id, window_size)
            .await?;

        let mut context = Vec::with_capacity(window.len() + 1);
        context.push(ContextMessage::new(
            Role::System,
            compose_system_prompt(base_prompt, &memory_block),
        ));
        context.extend(window);
        Ok(context)
    }
}

/// Appends the memory block to the base prompt; an empty block adds nothing.
pub fn compose_system_prompt(base_prompt: &str, memory_block: &str) -> String {
    if memory_block.is_empty() {
        base_prompt.to_string()
    } else {
        format!("{}\n\n{}", base_prompt, memory_block)
    }
}

/// Session title derived from the first user message.
pub fn auto_title(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{}{}", head, TITLE_ELLIPSIS)
    } else {
        head
    }
}

pub mod context_assembly;
pub mod extraction_queue;
pub mod fact_extraction;
pub mod memory_engine;

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};
use uuid::Uuid;

use crate::config::Config;
use crate::models::internal::{Message, NewMessage};
use crate::services::model_router::ModelRouter;
use crate::storage::repository::{ChatRepository, RepositoryError};
use context_assembly::{auto_title, ContextAssembler};
use extraction_queue::ExtractionQueue;
use memory_engine::MemoryEngine;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Both messages persisted by one turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub user_message: Message,
    pub assistant_message: Message,
}

/// Runs one conversational turn end to end: persist, assemble context,
/// dispatch, persist the reply, then hand the user text to fact extraction.
pub struct ChatOrchestrator {
    repo: Arc<dyn ChatRepository>,
    config: Arc<RwLock<Config>>,
    router: ModelRouter,
    memory: Arc<MemoryEngine>,
    context_assembler: ContextAssembler,
    extraction_queue: ExtractionQueue,
}

impl ChatOrchestrator {
    pub fn new(repo: Arc<dyn ChatRepository>, config: Arc<RwLock<Config>>) -> Self {
        let memory = Arc::new(MemoryEngine::new(repo.clone()));
        Self::with_memory(repo, config, memory)
    }

    pub fn with_memory(
        repo: Arc<dyn ChatRepository>,
        config: Arc<RwLock<Config>>,
        memory: Arc<MemoryEngine>,
    ) -> Self {
        Self {
            router: ModelRouter::new(config.clone()),
            context_assembler: ContextAssembler::new(memory.clone()),
            extraction_queue: ExtractionQueue::new(memory.clone()),
            repo,
            config,
            memory,
        }
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    pub fn memory(&self) -> &Arc<MemoryEngine> {
        &self.memory
    }

    pub fn extraction_queue(&self) -> &ExtractionQueue {
        &self.extraction_queue
    }

    pub async fn handle_turn(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        content: &str,
        model: Option<&str>,
        image_base64: Option<&str>,
    ) -> Result<TurnOutcome, OrchestratorError> {
        if self.repo.find_session(session_id, user_id).await?.is_none() {
            return Err(OrchestratorError::SessionNotFound(session_id));
        }

        let (base_prompt, window_size, background) = {
            let config = self.config.read().await;
            (
                config.system_prompt.clone(),
                config.memory_window,
                config.background_extraction,
            )
        };

        let user_message = self
            .repo
            .append_message(
                session_id,
                NewMessage::user(content, image_base64.is_some()),
                None,
            )
            .await?;

        let context = self
            .context_assembler
            .assemble(session_id, user_id, &base_prompt, window_size)
            .await?;

        let outcome = self.router.dispatch(&context, model, image_base64).await;
        debug!(%session_id, ?outcome, "Dispatch finished");

        let assistant_message = self
            .repo
            .append_message(
                session_id,
                NewMessage::assistant(outcome.into_text()),
                Some(auto_title(content)),
            )
            .await?;

        if background {
            self.extraction_queue.enqueue(user_id, content.to_string());
        } else if let Err(e) = self.memory.extract_and_store(user_id, content).await {
            error!(%user_id, "Memory extraction failed: {}", e);
        }

        Ok(TurnOutcome {
            user_message,
            assistant_message,
        })
    }
}

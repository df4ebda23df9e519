use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::backend::ChatBackend;
use super::session_store::SessionStore;
use super::types::{ConversationError, SessionConfig, ThreadId};
use crate::utils::error::BotError;

/// Routes each inbound message to the chat session of its thread.
pub struct ConversationRouter {
    sessions: SessionStore,
    backend: Arc<dyn ChatBackend>,
    config: SessionConfig,
}

impl ConversationRouter {
    pub fn new(backend: Arc<dyn ChatBackend>, config: SessionConfig) -> Self {
        info!(
            "Conversation router ready (model: {}, knowledge store: {})",
            config.model,
            config.store_id.as_deref().unwrap_or("none")
        );
        Self {
            sessions: SessionStore::new(),
            backend,
            config,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Answer `text` in the context of `thread_id`. Never fails: errors are
    /// logged and turned into a fixed apology.
    pub async fn handle_message(&self, thread_id: &ThreadId, text: &str) -> String {
        match self.try_handle_message(thread_id, text).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(thread_id = %thread_id, error = ?e, "Failed to answer message: {}", e);
                e.fallback_text().to_string()
            }
        }
    }

    pub async fn try_handle_message(
        &self,
        thread_id: &ThreadId,
        text: &str,
    ) -> Result<String, ConversationError> {
        let start = Instant::now();

        let (session, created) = self
            .sessions
            .get_or_create(thread_id, || self.backend.start_session(&self.config))
            .await
            .map_err(ConversationError::SessionCreation)?;

        if created {
            info!("Started new session for thread {}", thread_id);
        }

        // Holding the lock for the whole exchange keeps turns in arrival order
        let mut session = session.lock().await;
        let result = session.send(text).await;
        self.sessions.touch(thread_id);

        let reply = result.map_err(|e| match e {
            BotError::EmptyReply(reason) => {
                warn!("Thread {} got no text from the model: {}", thread_id, reason);
                ConversationError::EmptyReply
            }
            other => ConversationError::Exchange(other),
        })?;
        debug_assert!(!reply.trim().is_empty(), "chat session returned a blank reply");

        debug!(
            "Thread {} answered in {:?} ({} turns)",
            thread_id,
            start.elapsed(),
            session.turn_count()
        );

        Ok(reply)
    }
}

use async_trait::async_trait;

use super::types::{ChatTurn, SessionConfig};
use crate::utils::error::BotError;

/// A stateful conversation with the model. Each successful
/// `send_message` appends the user turn and the reply to the history.
///
/// An `Ok` reply is never blank: a reply without text is returned as
/// `BotError::EmptyReply` and, like any other error, leaves the history
/// untouched.
#[async_trait]
pub trait ChatSession: Send {
    async fn send_message(&mut self, text: &str) -> Result<String, BotError>;

    fn history(&self) -> &[ChatTurn];
}

/// Creates chat sessions against the model service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn start_session(&self, config: &SessionConfig)
        -> Result<Box<dyn ChatSession>, BotError>;
}

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::utils::error::BotError;

/// Shown when a thread's session could not be started.
pub const SESSION_FALLBACK: &str =
    "Sorry, I couldn't start a conversation for this thread. Please try again in a moment.";

/// Shown when the model call for a message failed.
pub const REPLY_FALLBACK: &str = "Sorry, I ran into an error processing that.";

/// Key of one conversation thread (the root message timestamp in Slack).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ThreadId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Everything a new chat session is configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub model: String,
    pub system_instruction: String,
    /// Document store attached as a retrieval tool, if any.
    pub store_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One entry of a session's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Why a message could not be answered.
#[derive(Error, Debug)]
pub enum ConversationError {
    #[error("failed to create session: {0}")]
    SessionCreation(#[source] BotError),

    #[error("failed to exchange message: {0}")]
    Exchange(#[source] BotError),

    #[error("model returned an empty reply")]
    EmptyReply,
}

impl ConversationError {
    /// User-facing text for this failure. Never contains error detail.
    pub fn fallback_text(&self) -> &'static str {
        match self {
            ConversationError::SessionCreation(_) => SESSION_FALLBACK,
            ConversationError::Exchange(_) | ConversationError::EmptyReply => REPLY_FALLBACK,
        }
    }
}

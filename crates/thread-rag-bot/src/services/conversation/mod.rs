//! Thread-scoped conversation sessions
//!
//! Provides:
//! - One chat session per thread id, created lazily on the first message
//! - Per-thread serialization of turns
//! - Optional eviction of idle threads
//! - Fallback replies when session creation or the model call fails

pub mod backend;
pub mod router;
pub mod session_store;
pub mod types;

pub use backend::{ChatBackend, ChatSession};
pub use router::ConversationRouter;
pub use session_store::{SessionStore, SharedSession, ThreadSession};
pub use types::{
    ChatTurn, ConversationError, Role, SessionConfig, ThreadId, REPLY_FALLBACK, SESSION_FALLBACK,
};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::services::conversation::ThreadId;

static MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<@[A-Z0-9]+(\|[^>]*)?>").expect("mention pattern is valid"));

// ===== EVENTS API =====

/// Outer envelope of an Events API request.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEnvelope {
    UrlVerification {
        challenge: String,
    },
    EventCallback {
        event: SlackEvent,
        #[serde(default)]
        event_id: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEvent {
    AppMention(MentionEvent),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MentionEvent {
    pub channel: String,
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

impl MentionEvent {
    /// Root timestamp of the thread, or the message's own when it starts one.
    pub fn thread_id(&self) -> ThreadId {
        ThreadId::new(self.thread_ts.as_deref().unwrap_or(&self.ts))
    }

    /// None for messages posted by bots.
    pub fn to_inbound(&self) -> Option<InboundMessage> {
        if self.bot_id.is_some() {
            return None;
        }

        let stripped = strip_mentions(&self.text);
        let text = if stripped.is_empty() {
            self.text.trim().to_string()
        } else {
            stripped
        };

        Some(InboundMessage {
            channel: self.channel.clone(),
            thread_id: self.thread_id(),
            text,
        })
    }
}

/// Remove `<@U123>` user mentions and surrounding whitespace.
pub fn strip_mentions(text: &str) -> String {
    MENTION.replace_all(text, "").trim().to_string()
}

/// A user message ready for the conversation router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel: String,
    pub thread_id: ThreadId,
    pub text: String,
}

// ===== WEB API =====

#[derive(Debug, Serialize)]
pub struct PostMessageRequest<'a> {
    pub channel: &'a str,
    pub thread_ts: &'a str,
    pub text: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct SlackApiResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

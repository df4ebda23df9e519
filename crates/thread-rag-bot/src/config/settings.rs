use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::error::BotError;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    pub gemini: GeminiConfig,
    pub slack: SlackConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SlackConfig {
    pub bot_token: String,
    pub signing_secret: String,
    #[serde(default = "default_slack_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_timestamp_tolerance")]
    pub timestamp_tolerance_seconds: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KnowledgeConfig {
    #[serde(default = "default_folder")]
    pub folder: PathBuf,
    #[serde(default = "default_store_display_name")]
    pub store_display_name: String,
    /// Pins a store by its remote identifier instead of searching by display name.
    #[serde(default)]
    pub store_id: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Zero waits for indexing forever.
    #[serde(default = "default_poll_timeout_seconds")]
    pub poll_timeout_seconds: Option<u64>,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            folder: default_folder(),
            store_display_name: default_store_display_name(),
            store_id: None,
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_seconds: default_poll_timeout_seconds(),
        }
    }
}

impl KnowledgeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_seconds
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionsConfig {
    /// Evict threads idle for longer than this. Unset keeps sessions for the
    /// lifetime of the process.
    #[serde(default)]
    pub idle_ttl_seconds: Option<u64>,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_ttl_seconds: None,
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptsConfig {
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            system_instruction: default_system_instruction(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_timeout_seconds() -> u64 {
    120
}

fn default_slack_api_base_url() -> String {
    "https://slack.com/api".to_string()
}

fn default_timestamp_tolerance() -> i64 {
    300
}

fn default_folder() -> PathBuf {
    PathBuf::from("knowledge")
}

fn default_store_display_name() -> String {
    "slack-bot-knowledge-base".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_poll_timeout_seconds() -> Option<u64> {
    Some(600)
}

fn default_sweep_interval() -> u64 {
    300
}

pub fn default_system_instruction() -> String {
    "You are a helpful Slack assistant. Answer questions using the documents in the attached \
     knowledge base whenever they are relevant, and say so when the knowledge base does not \
     cover a question. Keep track of the earlier messages in this thread and use them as \
     context for follow-up questions."
        .to_string()
}

impl Settings {
    pub fn load() -> Result<Self, BotError> {
        dotenvy::dotenv().ok();

        // Example: APP__GEMINI__API_KEY=...
        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), BotError> {
        let required = [
            ("gemini.api_key", &self.gemini.api_key),
            ("slack.bot_token", &self.slack.bot_token),
            ("slack.signing_secret", &self.slack.signing_secret),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(BotError::Config(format!("missing required setting `{}`", key)));
            }
        }

        if self.knowledge.store_display_name.trim().is_empty() {
            return Err(BotError::Config(
                "knowledge.store_display_name must not be empty".to_string(),
            ));
        }

        if self.knowledge.poll_interval_ms == 0 {
            return Err(BotError::Config(
                "knowledge.poll_interval_ms must be greater than zero".to_string(),
            ));
        }

        if self.sessions.idle_ttl_seconds.is_some() && self.sessions.sweep_interval_seconds == 0 {
            return Err(BotError::Config(
                "sessions.sweep_interval_seconds must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

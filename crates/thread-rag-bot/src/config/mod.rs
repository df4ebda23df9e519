pub mod settings;

pub use settings::{
    GeminiConfig, KnowledgeConfig, PromptsConfig, ServerConfig, SessionsConfig, Settings,
    SlackConfig,
};

use async_trait::async_trait;
use tracing::debug;

use super::client::GeminiClient;
use super::types::{Content, FileSearch, GenerateContentRequest, Tool};
use crate::services::conversation::{ChatBackend, ChatSession, ChatTurn, SessionConfig};
use crate::utils::error::BotError;

/// Chat session backed by `generateContent`. The API is stateless, so the
/// session keeps the history and replays it on every turn.
pub struct GeminiChatSession {
    client: GeminiClient,
    config: SessionConfig,
    history: Vec<ChatTurn>,
}

impl GeminiChatSession {
    pub fn new(client: GeminiClient, config: SessionConfig) -> Self {
        Self {
            client,
            config,
            history: Vec::new(),
        }
    }

    fn build_request(&self, text: &str) -> GenerateContentRequest {
        let mut contents: Vec<Content> = self.history.iter().map(Content::from).collect();
        contents.push(Content::from(&ChatTurn::user(text)));

        let tools = self
            .config
            .store_id
            .iter()
            .map(|store| Tool {
                file_search: FileSearch {
                    file_search_store_names: vec![store.clone()],
                },
            })
            .collect();

        GenerateContentRequest {
            contents,
            system_instruction: Some(Content::text(None, &self.config.system_instruction)),
            tools,
        }
    }
}

#[async_trait]
impl ChatSession for GeminiChatSession {
    async fn send_message(&mut self, text: &str) -> Result<String, BotError> {
        let request = self.build_request(text);
        let response = self
            .client
            .generate_content(&self.config.model, &request)
            .await?;

        let reply = response
            .reply_text()
            .ok_or_else(|| BotError::EmptyReply(response.missing_text_reason()))?;

        // History only grows on a complete exchange
        self.history.push(ChatTurn::user(text));
        self.history.push(ChatTurn::model(reply.clone()));
        debug!("Session history now has {} turns", self.history.len());

        Ok(reply)
    }

    fn history(&self) -> &[ChatTurn] {
        &self.history
    }
}

#[async_trait]
impl ChatBackend for GeminiClient {
    async fn start_session(
        &self,
        config: &SessionConfig,
    ) -> Result<Box<dyn ChatSession>, BotError> {
        Ok(Box::new(GeminiChatSession::new(self.clone(), config.clone())))
    }
}

use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::config::SlackConfig;
use crate::models::slack::{PostMessageRequest, SlackApiResponse};
use crate::utils::error::BotError;

/// Minimal Slack Web API client: posts replies into threads.
#[derive(Clone)]
pub struct SlackClient {
    client: Client,
    config: SlackConfig,
}

impl SlackClient {
    pub fn new(config: SlackConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    pub async fn post_message(
        &self,
        channel: &str,
        thread_ts: &str,
        text: &str,
    ) -> Result<(), BotError> {
        let url = format!(
            "{}/chat.postMessage",
            self.config.api_base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.bot_token)
            .json(&PostMessageRequest {
                channel,
                thread_ts,
                text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Slack(format!("HTTP {}: {}", status, body)));
        }

        // Slack reports most failures as 200 with ok=false
        let body: SlackApiResponse = response
            .json()
            .await
            .map_err(|e| BotError::Slack(format!("Failed to parse response: {}", e)))?;
        if !body.ok {
            return Err(BotError::Slack(
                body.error.unwrap_or_else(|| "unknown_error".to_string()),
            ));
        }

        debug!("Posted reply to {} (thread {})", channel, thread_ts);
        Ok(())
    }
}

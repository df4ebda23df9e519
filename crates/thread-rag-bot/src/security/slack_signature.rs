use axum::http::HeaderMap;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::utils::error::BotError;

type HmacSha256 = Hmac<Sha256>;

const VERSION: &str = "v0";

/// Verifies the `X-Slack-Signature` header of Events API requests.
#[derive(Debug, Clone)]
pub struct SlackSignatureVerifier {
    signing_secret: String,
    timestamp_tolerance: i64, // seconds
}

impl SlackSignatureVerifier {
    pub fn new(signing_secret: String, timestamp_tolerance: i64) -> Self {
        Self {
            signing_secret,
            timestamp_tolerance,
        }
    }

    pub fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), BotError> {
        self.verify_at(headers, body, Utc::now().timestamp())
    }

    pub fn verify_at(&self, headers: &HeaderMap, body: &[u8], now: i64) -> Result<(), BotError> {
        // 1. Timestamp (replay protection)
        let timestamp = headers
            .get("X-Slack-Request-Timestamp")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or_else(|| {
                BotError::Unauthorized("Missing or invalid X-Slack-Request-Timestamp".to_string())
            })?;

        let diff = (now - timestamp).abs();
        if diff > self.timestamp_tolerance {
            warn!("Slack request timestamp off by {} seconds", diff);
            return Err(BotError::Unauthorized(
                "Request timestamp out of tolerance window".to_string(),
            ));
        }

        // 2. Signature: v0=hex(HMAC-SHA256(secret, "v0:{ts}:{body}"))
        let signature = headers
            .get("X-Slack-Signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| BotError::Unauthorized("Missing X-Slack-Signature".to_string()))?;

        let provided = signature
            .strip_prefix("v0=")
            .and_then(|hex_sig| hex::decode(hex_sig).ok())
            .ok_or_else(|| BotError::Unauthorized("Malformed X-Slack-Signature".to_string()))?;

        let mac = self.mac(timestamp, body)?;
        // Constant-time comparison
        mac.verify_slice(&provided).map_err(|_| {
            warn!("Invalid Slack request signature");
            BotError::Unauthorized("Invalid signature".to_string())
        })?;

        debug!("Slack request signature verified");
        Ok(())
    }

    /// Signature header value for `body` sent at `timestamp`.
    pub fn sign(&self, timestamp: i64, body: &[u8]) -> Result<String, BotError> {
        let mac = self.mac(timestamp, body)?;
        Ok(format!("{}={}", VERSION, hex::encode(mac.finalize().into_bytes())))
    }

    fn mac(&self, timestamp: i64, body: &[u8]) -> Result<HmacSha256, BotError> {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes())
            .map_err(|e| BotError::Config(format!("HMAC error: {}", e)))?;
        mac.update(format!("{}:{}:", VERSION, timestamp).as_bytes());
        mac.update(body);
        Ok(mac)
    }
}

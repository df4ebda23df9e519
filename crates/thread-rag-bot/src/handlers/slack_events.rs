use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, error, info};

use crate::models::slack::{InboundMessage, SlackEnvelope, SlackEvent};
use crate::state::AppState;
use crate::utils::error::BotError;

/// POST /slack/events
///
/// Slack expects an acknowledgement within 3 seconds, so mentions are
/// answered on a background task and the request returns immediately.
pub async fn slack_events_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, BotError> {
    state.verifier.verify(&headers, &body)?;

    // Redeliveries happen when the first ack was slow; the original is already in flight
    if let Some(retry) = headers.get("X-Slack-Retry-Num") {
        debug!("Ignoring Slack retry #{:?}", retry);
        return Ok(StatusCode::OK.into_response());
    }

    let envelope: SlackEnvelope = serde_json::from_slice(&body)
        .map_err(|e| BotError::BadRequest(format!("Invalid event payload: {}", e)))?;

    match envelope {
        SlackEnvelope::UrlVerification { challenge } => {
            info!("Answering Slack URL verification");
            Ok(Json(json!({ "challenge": challenge })).into_response())
        }
        SlackEnvelope::EventCallback {
            event: SlackEvent::AppMention(event),
            event_id,
        } => {
            match event.to_inbound() {
                Some(message) => {
                    info!(
                        "📨 Mention {} in channel {} (thread {})",
                        event_id.as_deref().unwrap_or("-"),
                        message.channel,
                        message.thread_id
                    );
                    tokio::spawn(process_mention(state, message));
                }
                None => debug!("Ignoring mention posted by a bot"),
            }
            Ok(StatusCode::OK.into_response())
        }
        _ => {
            debug!("Ignoring unsupported Slack event");
            Ok(StatusCode::OK.into_response())
        }
    }
}

/// Route one mention through the thread's session and post the reply
/// back into the same thread.
pub async fn process_mention(state: AppState, message: InboundMessage) {
    let reply = state
        .router
        .handle_message(&message.thread_id, &message.text)
        .await;

    if let Err(e) = state
        .slack
        .post_message(&message.channel, message.thread_id.as_str(), &reply)
        .await
    {
        error!(
            "Failed to post reply to {} (thread {}): {}",
            message.channel, message.thread_id, e
        );
    }
}

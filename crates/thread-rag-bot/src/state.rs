use axum::extract::FromRef;
use std::sync::Arc;

use crate::security::SlackSignatureVerifier;
use crate::services::{ConversationRouter, SlackClient};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ConversationRouter>,
    pub slack: Arc<SlackClient>,
    pub verifier: Arc<SlackSignatureVerifier>,
}

impl FromRef<AppState> for Arc<ConversationRouter> {
    fn from_ref(state: &AppState) -> Self {
        state.router.clone()
    }
}

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use thread_rag_bot::{
    build_router,
    config::Settings,
    security::SlackSignatureVerifier,
    services::{
        conversation::SessionConfig,
        knowledge::PollPolicy,
        ConversationRouter, GeminiClient, KnowledgeBaseSync, SlackClient,
    },
    state::AppState,
    utils::logger::init_logger,
};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;

    // Guard must live until shutdown so buffered log lines get flushed
    let _guard = init_logger()?;

    info!("🚀 Starting thread-rag-bot v{}", env!("CARGO_PKG_VERSION"));

    let gemini = Arc::new(GeminiClient::new(settings.gemini.clone()));

    // Knowledge base must be in place before any thread can use it
    let sync = KnowledgeBaseSync::new(
        gemini.clone(),
        PollPolicy {
            interval: settings.knowledge.poll_interval(),
            timeout: settings.knowledge.poll_timeout(),
        },
    )
    .with_pinned_store(settings.knowledge.store_id.clone());

    let store_id = sync
        .ensure_synced(
            Path::new(&settings.knowledge.folder),
            &settings.knowledge.store_display_name,
        )
        .await
        .context("knowledge base sync failed")?;
    info!("✅ Knowledge base ready: {}", store_id);

    let router = Arc::new(ConversationRouter::new(
        gemini,
        SessionConfig {
            model: settings.gemini.model.clone(),
            system_instruction: settings.prompts.system_instruction.clone(),
            store_id: Some(store_id),
        },
    ));

    if let Some(ttl) = settings.sessions.idle_ttl_seconds {
        router.sessions().spawn_idle_sweeper(
            Duration::from_secs(ttl),
            Duration::from_secs(settings.sessions.sweep_interval_seconds),
        );
        info!("✅ Idle thread eviction enabled (ttl {}s)", ttl);
    }

    let state = AppState {
        router,
        slack: Arc::new(SlackClient::new(settings.slack.clone())),
        verifier: Arc::new(SlackSignatureVerifier::new(
            settings.slack.signing_secret.clone(),
            settings.slack.timestamp_tolerance_seconds,
        )),
    };

    let app = build_router(state);

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    info!("🎯 Listening for Slack events on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! Proxy server setup and initialization.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::proxy::reasoning_cache::ReasoningCache;
use crate::proxy::sessions::SessionRegistry;
use crate::proxy::state::AppState;
use crate::storage::TrajectoryStore;

use super::{
    anthropic_messages, healthz, list_routes, list_sessions, not_found, openai_chat_completions,
    register_session, session_event,
};

/// Build shared collaborators, the router, and serve until `shutdown_rx` fires.
pub async fn start_proxy(
    config: Config,
    sessions: Arc<SessionRegistry>,
    reasoning: Arc<ReasoningCache>,
    trajectory: Arc<TrajectoryStore>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<()> {
    let bind_addr = config.bind_addr;

    // A standard keep-alive client suffices; no connection pool tuning beyond defaults.
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()
        .context("failed to build upstream HTTP client")?;

    let state = AppState::new(config.routes, sessions, reasoning, trajectory, client);

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/routes", get(list_routes))
        .route("/sessions", get(list_sessions))
        .route("/sessions/register", post(register_session))
        .route("/sessions/event", post(session_event))
        .route("/v1/messages", post(anthropic_messages))
        .route("/v1/message", post(anthropic_messages))
        .route("/v1/chat/completions", post(openai_chat_completions))
        .fallback(not_found)
        .with_state(state);

    tracing::info!("starting proxy on {}", bind_addr);

    let listener = TcpListener::bind(bind_addr)
        .await
        .context("failed to bind to address")?;

    tracing::info!("proxy listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.await.ok();
        })
        .await
        .context("server error")?;

    tracing::info!("proxy server shut down gracefully");
    Ok(())
}

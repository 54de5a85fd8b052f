// llm-relay - local LLM-protocol proxy and trajectory recorder
//
// Accepts chat requests in the Anthropic Messages or OpenAI Chat Completions
// protocol, routes them to a configured upstream, translating between
// protocols when the upstream speaks the other dialect, and records a
// complete per-session trajectory on disk.

mod cli;
mod config;
mod events;
mod proxy;
mod storage;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use config::Config;
use proxy::reasoning_cache::ReasoningCache;
use proxy::sessions::SessionRegistry;
use storage::TrajectoryStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // `config --show`/`--path` diagnose without starting the server.
    if cli::handle_cli(&cli) {
        return Ok(());
    }

    let config = Config::load(
        cli.cfg_file.clone(),
        cli.host.clone(),
        cli.port,
        cli.log_dir.clone(),
    )?;

    // RUST_LOG env var > "info" default.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        bind_addr = %config.bind_addr,
        log_dir = %config.log_dir.display(),
        routes = config.routes.len(),
        "starting llm-relay"
    );

    let sessions = Arc::new(SessionRegistry::new());
    let reasoning = Arc::new(ReasoningCache::new());
    let trajectory = Arc::new(TrajectoryStore::new(config.log_dir.clone()));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let server_handle = tokio::spawn(proxy::server::start_proxy(
        config,
        sessions,
        reasoning,
        trajectory,
        shutdown_rx,
    ));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down...");
    let _ = shutdown_tx.send(());

    server_handle.await??;
    tracing::info!("shutdown complete");
    Ok(())
}

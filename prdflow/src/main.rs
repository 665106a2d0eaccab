//! Prdflow server binary.

use anyhow::Context;
use clap::Parser;
use prdflow::config::AppConfig;
use prdflow::events::LoggingEventSink;
use prdflow::observability::init_logging;
use prdflow::pipeline::Orchestrator;
use prdflow::server::{self, AppState};
use prdflow::stages::{definitions, validate_definitions};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::parse();
    init_logging(config.log_json).map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;
    config.validate().context("invalid configuration")?;
    validate_definitions(definitions()).context("invalid stage table")?;

    let backend = config.effective_backend();
    if backend != config.backend {
        warn!(requested = ?config.backend, "No API key configured, using the stub backend");
    }

    let store = config.build_store().context("failed to open run store")?;
    let invoker = config.build_invoker().context("failed to build model backend")?;
    let orchestrator = Arc::new(
        Orchestrator::new(store, invoker)
            .with_events(Arc::new(LoggingEventSink::default()))
            .with_retry(config.retry_config()),
    );

    let resumed = orchestrator.resume_incomplete().await;
    if !resumed.is_empty() {
        info!(runs = resumed.len(), "Resumed interrupted runs");
    }

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        %addr,
        backend = orchestrator.backend_name(),
        store = ?config.store,
        "Prdflow starting"
    );

    let router = server::router(AppState::new(orchestrator), &config.cors_origins);
    server::serve(listener, router).await?;
    Ok(())
}

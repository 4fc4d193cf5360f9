//! Startup helpers for the chat relay server.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;

use crate::config::RelayConfig;
use crate::conversation::maintenance::BackgroundCleanup;
use crate::server::{self, AppState};

/// Run the server until Ctrl-C.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting chat relay v{}", env!("CARGO_PKG_VERSION"));

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            return ExitCode::from(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(serve(config)) {
        tracing::error!("Server error: {e:#}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Build state, start the cleanup worker, and serve until Ctrl-C.
///
/// # Errors
/// Returns an error if state construction or the server fails.
pub async fn serve(config: RelayConfig) -> anyhow::Result<()> {
    tracing::info!(
        llm_url = %config.llm.base_url,
        model = %config.llm.model,
        redis = config.backend.redis_url.is_some(),
        "Relay configuration loaded"
    );

    let state = AppState::from_config(&config)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to initialize application state")?;

    let cleanup = BackgroundCleanup::new(Arc::clone(&state.store), config.cleanup.clone());
    let cleanup_shutdown = cleanup.shutdown_notifier();
    let cleanup_handle = cleanup.spawn();

    let result = server::run_server_with_shutdown(
        state,
        config.server.addr(),
        shutdown_signal(),
    )
    .await;

    cleanup_shutdown.notify_one();
    if let Err(e) = cleanup_handle.await {
        tracing::warn!("Cleanup worker ended abnormally: {e}");
    }

    result.map_err(|e| anyhow::anyhow!(e)).context("server failed")
}

/// Resolve on Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

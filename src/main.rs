//! botkit - admin process for the bot runtime
//!
//! Composes the shared components, starts the background scheduler and
//! serves the admin API until interrupted.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use botkit::api::create_router;
use botkit::{AppState, Config, Scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "botkit=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting botkit");

    let config = Config::from_env();
    info!(
        cache_max_records = config.cache.max_records,
        cache_hold_ms = config.cache.max_hold_time.as_millis() as u64,
        rate_wait_ms = config.limiter.wait_between_requests.as_millis() as u64,
        rate_max_stack = config.limiter.max_request_stack,
        port = config.server_port,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config);
    let scheduler = Scheduler::new();
    state.register_sweeps(&scheduler, &config).await;
    scheduler.start().await;
    info!(jobs = scheduler.job_count().await, "Background scheduler started");

    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Admin API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("admin server failed")?;

    scheduler.shutdown().await;
    let responses = state.responses.clear().await;
    let buttons = state.buttons.clear().await;
    info!(responses, buttons, "Shutdown complete");

    Ok(())
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}

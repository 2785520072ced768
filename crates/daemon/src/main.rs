// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `loftd`, the Loft control plane daemon.

use clap::Parser;
use loft_daemon::{gateway, routes, AppState, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::parse();
    if let Err(message) = config.validate() {
        anyhow::bail!("invalid configuration: {message}");
    }

    let api_addr = config.api_addr;
    let preview_addr = config.preview_addr;
    let state = AppState::from_config(config).await?;

    // Workers from a previous life are gone; their rows surface as
    // `error` so the next Start can recover them.
    state.lifecycle.recover_interrupted().await.map_err(|e| anyhow::anyhow!("{e}"))?;

    let sweeper = state.spawn_sweeper();

    let api_listener = tokio::net::TcpListener::bind(api_addr).await?;
    let preview_listener = tokio::net::TcpListener::bind(preview_addr).await?;
    tracing::info!(%api_addr, %preview_addr, "loftd listening");

    let api = axum::serve(api_listener, routes::router(state.clone()))
        .with_graceful_shutdown(shutdown_signal());
    // The preview listener has its own accept loop so each connection
    // gets the idle-timeout wrapper and the header read budget.
    let preview =
        gateway::serve(preview_listener, gateway::router(state), shutdown_signal());

    let (api_result, preview_result) = tokio::join!(async { api.await }, preview);
    api_result?;
    preview_result?;

    sweeper.abort();
    tracing::info!("loftd shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let terminate = async {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to install sigterm handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}

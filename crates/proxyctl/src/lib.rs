// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proxyctl: control plane that issues agent credentials, holds each
//! agent's persistent channel, and dispatches proxy assignments to it.

pub mod channel;
pub mod client;
pub mod config;
pub mod credential;
pub mod envelope;
pub mod error;
pub mod events;
pub mod liveness;
pub mod registry;
pub mod service;
pub mod state;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::ControlConfig;
use crate::liveness::spawn_sweeper;
use crate::state::ControlState;
use crate::transport::build_router;

/// Run the control server until SIGINT/SIGTERM.
pub async fn run(config: ControlConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    serve(config, listener, shutdown).await
}

/// Serve on an already-bound listener until `shutdown` is cancelled.
pub async fn serve(
    config: ControlConfig,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let state = Arc::new(ControlState::new(config, shutdown.clone()));

    let loaded = state.credentials.load().await?;
    if loaded > 0 {
        tracing::info!(loaded, "restored persisted credentials");
    }

    spawn_sweeper(Arc::clone(&state));

    let router = build_router(Arc::clone(&state));
    tracing::info!("proxyctl listening on {}", listener.local_addr()?);
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    state.close_all().await;
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => tracing::info!("received SIGTERM"),
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => tracing::info!("received SIGINT"),
        }
        shutdown.cancel();
    });
}

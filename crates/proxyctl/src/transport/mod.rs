// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the control plane.

pub mod http;
pub mod ws;
pub mod ws_events;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::ControlState;

/// Build the axum `Router` with all control-plane routes.
pub fn build_router(state: Arc<ControlState>) -> Router {
    Router::new()
        .route("/health", get(http::health))
        // Front-end surface
        .route("/create-token", post(http::create_token))
        .route("/assign-proxy", post(http::assign_proxy))
        .route("/agents", get(http::list_agents))
        .route("/tokens", get(http::list_tokens))
        .route("/tokens/{token}", delete(http::revoke_token))
        // Agent channel
        .route("/ws", get(ws::ws_handler))
        // Observers
        .route("/ws/events", get(ws_events::ws_events_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

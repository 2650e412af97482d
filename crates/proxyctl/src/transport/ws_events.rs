// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observer WebSocket: streams [`ControlEvent`]s as JSON text frames.
//!
//! [`ControlEvent`]: crate::events::ControlEvent

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use crate::events::EventFilter;
use crate::state::ControlState;

/// Query parameters for the events WebSocket.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Comma-separated event types, or "all" (default).
    #[serde(default)]
    pub types: String,
}

/// `GET /ws/events`: WebSocket upgrade for the event stream.
pub async fn ws_events_handler(
    State(state): State<Arc<ControlState>>,
    Query(query): Query<EventsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let filter = EventFilter::new(&query.types);
    ws.on_upgrade(move |socket| handle_observer(state, filter, socket))
}

async fn handle_observer(state: Arc<ControlState>, filter: EventFilter, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut events = state.events.subscribe();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            event = events.recv() => {
                let event = match event {
                    Ok(e) => e,
                    Err(RecvError::Lagged(n)) => {
                        tracing::debug!(lagged = n, "event observer lagged, skipping");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if !filter.wants(&event) {
                    continue;
                }
                let Ok(json) = serde_json::to_string(&event) else { continue };
                if ws_tx.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }
    let _ = ws_tx.close().await;
}

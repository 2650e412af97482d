// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent channel: the persistent WebSocket each agent keeps open.
//!
//! The socket is validated after upgrade; an unknown token gets close 4003
//! before any registry mutation. Once bound, this task owns the socket: it
//! drains the [`AgentChannel`] queue into the sink, feeds inbound frames to
//! the control service, and unbinds on exit.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::channel::{close, close_frame, AgentChannel};
use crate::credential::redact;
use crate::registry::AgentConnection;
use crate::state::ControlState;

/// Query parameters for the agent WS upgrade.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentWsQuery {
    pub token: Option<String>,
    #[serde(rename = "agentID", alias = "agentId")]
    pub agent_id: Option<String>,
}

/// `GET /ws?token=…&agentID=…`: WebSocket upgrade for an agent.
pub async fn ws_handler(
    State(state): State<Arc<ControlState>>,
    Query(query): Query<AgentWsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_agent(state, query, socket))
}

async fn handle_agent(state: Arc<ControlState>, query: AgentWsQuery, mut socket: WebSocket) {
    let token = query.token.unwrap_or_default();
    let (channel, rx) = AgentChannel::new(state.config.channel_depth);

    let conn = match state.accept_connection(&token, query.agent_id, channel).await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::info!(token = redact(&token), err = %e, "rejecting agent connection");
            let frame = close_frame(close::INVALID_TOKEN, "invalid token");
            let _ = socket.send(Message::Close(Some(frame))).await;
            return;
        }
    };

    let reason = run_agent(&state, &conn, rx, socket).await;
    state.connection_closed(&conn, reason).await;
}

/// Per-connection loop. Returns why the connection ended.
async fn run_agent(
    state: &ControlState,
    conn: &AgentConnection,
    mut rx: mpsc::Receiver<Message>,
    socket: WebSocket,
) -> &'static str {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let channel = conn.channel().clone();

    // Far-future placeholder keeps the select arm uniform when pings are off.
    let ping_every = state.config.ping_interval().unwrap_or(Duration::from_secs(86400 * 365));
    let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + ping_every, ping_every);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let pings_enabled = state.config.ping_interval().is_some();

    loop {
        tokio::select! {
            _ = channel.cancel_token().cancelled() => {
                let frame = channel.pending_close().unwrap_or_else(|| close_frame(close::GOING_AWAY, "closed"));
                flush_and_close(&mut ws_tx, &mut rx, frame).await;
                return "closed by server";
            }
            _ = state.shutdown.cancelled() => {
                let frame = close_frame(close::GOING_AWAY, "server shutting down");
                flush_and_close(&mut ws_tx, &mut rx, frame).await;
                return "shutdown";
            }

            // Commands queued by dispatch.
            out = rx.recv() => {
                let Some(msg) = out else { return "channel dropped" };
                if let Err(e) = ws_tx.send(msg).await {
                    tracing::warn!(token = redact(conn.token()), err = %e, "agent write failed");
                    return "write error";
                }
            }

            _ = ping.tick(), if pings_enabled => {
                if ws_tx.send(Message::Ping(Default::default())).await.is_err() {
                    return "write error";
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        state.handle_agent_text(conn, text.as_str()).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::debug!(agent_id = %conn.agent_id(), "ignoring binary frame");
                        state.registry.touch(conn.token(), conn.conn_id()).await;
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        state.registry.touch(conn.token(), conn.conn_id()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => return "closed",
                    Some(Err(e)) => {
                        tracing::debug!(agent_id = %conn.agent_id(), err = %e, "agent read failed");
                        return "read error";
                    }
                }
            }
        }
    }
}

/// Deliver commands already queued, then send `frame`.
async fn flush_and_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    rx: &mut mpsc::Receiver<Message>,
    frame: CloseFrame,
) {
    while let Ok(msg) = rx.try_recv() {
        if ws_tx.send(msg).await.is_err() {
            return;
        }
    }
    let _ = ws_tx.send(Message::Close(Some(frame))).await;
}

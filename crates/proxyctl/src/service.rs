// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control service operations: token issuance, agent admission, inbound
//! result handling, and command dispatch.
//!
//! Every outcome here is an ordinary return value. "Agent offline" and
//! rejected handshakes are expected and surface to callers as such.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::channel::{close, AgentChannel, ChannelError};
use crate::credential::{redact, Credential, EntropyError};
use crate::envelope::{decode_inbound, AgentMessage, CommandEnvelope};
use crate::error::ControlError;
use crate::events::ControlEvent;
use crate::registry::{AgentConnection, BindError};
use crate::state::ControlState;

/// Longest a dispatch may wait for a correlated result.
pub const MAX_RESULT_WAIT: Duration = Duration::from_secs(30);

/// Why a dispatch did not reach an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    MissingToken,
    InvalidFilters,
    AgentOffline,
    Write(ChannelError),
}

impl DispatchError {
    pub fn code(&self) -> ControlError {
        match self {
            Self::MissingToken | Self::InvalidFilters => ControlError::BadRequest,
            Self::AgentOffline => ControlError::AgentOffline,
            Self::Write(ChannelError::Encode) => ControlError::Internal,
            Self::Write(_) => ControlError::TransportWrite,
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingToken => f.write_str("token required"),
            Self::InvalidFilters => f.write_str("filters must be an object"),
            Self::AgentOffline => f.write_str("agent offline"),
            Self::Write(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for DispatchError {}

/// A command accepted onto an agent channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub request_id: String,
    pub agent_id: String,
    /// Correlated result, when the caller asked to wait and one arrived.
    pub result: Option<serde_json::Value>,
    /// The caller asked to wait and no result arrived in time.
    pub timed_out: bool,
}

/// Dispatches awaiting an `assign_result` with a matching `request_id`.
#[derive(Default)]
pub struct PendingResults {
    waiters: Mutex<HashMap<String, oneshot::Sender<serde_json::Value>>>,
}

impl PendingResults {
    /// Register a waiter. The entry is removed when the guard drops, so an
    /// abandoned dispatch never leaves a waiter behind.
    pub fn register(&self, request_id: &str) -> PendingGuard<'_> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(request_id.to_owned(), tx);
        PendingGuard { pending: self, request_id: request_id.to_owned(), rx }
    }

    /// Hand `payload` to the waiter for `request_id`. Returns whether one existed.
    pub fn complete(&self, request_id: &str, payload: serde_json::Value) -> bool {
        match self.waiters.lock().remove(request_id) {
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.lock().is_empty()
    }
}

/// A registered waiter; deregisters on drop.
pub struct PendingGuard<'a> {
    pending: &'a PendingResults,
    request_id: String,
    rx: oneshot::Receiver<serde_json::Value>,
}

impl PendingGuard<'_> {
    /// Wait up to `timeout` for the result.
    pub async fn wait(mut self, timeout: Duration) -> Option<serde_json::Value> {
        tokio::time::timeout(timeout, &mut self.rx).await.ok()?.ok()
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.waiters.lock().remove(&self.request_id);
    }
}

impl ControlState {
    /// Mint a credential for `owner_id`.
    pub async fn issue_token(&self, owner_id: &str) -> Result<Credential, EntropyError> {
        let cred = match self.credentials.issue(owner_id).await {
            Ok(cred) => cred,
            Err(e) => {
                tracing::error!(owner_id, err = %e, "token generation failed");
                return Err(e);
            }
        };
        tracing::info!(owner_id, token = redact(&cred.token), "token issued");
        self.events.publish(ControlEvent::TokenIssued { owner_id: owner_id.to_owned() });
        Ok(cred)
    }

    /// Invalidate `token` and close any agent bound with it.
    pub async fn revoke_token(&self, token: &str) -> Option<Credential> {
        let (cred, evicted) = self.registry.revoke(&self.credentials, token).await?;
        tracing::info!(owner_id = %cred.owner_id, token = redact(token), "token revoked");

        if let Some(conn) = evicted {
            self.publish_offline(&conn, "revoked");
        }
        self.events.publish(ControlEvent::TokenRevoked { owner_id: cred.owner_id.clone() });
        Some(cred)
    }

    /// Admit an agent channel under `token`.
    ///
    /// On error the registry is untouched and the caller must reject the
    /// connection with [`close::INVALID_TOKEN`].
    pub async fn accept_connection(
        &self,
        token: &str,
        agent_id: Option<String>,
        channel: AgentChannel,
    ) -> Result<Arc<AgentConnection>, BindError> {
        if token.is_empty() {
            return Err(BindError::TokenInvalid);
        }
        let agent_id = agent_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let binding = self.registry.bind(&self.credentials, token, agent_id, channel).await?;
        if let Some(ref old) = binding.superseded {
            self.publish_offline(old, "superseded");
        }

        let conn = binding.connection;
        tracing::info!(
            token = redact(token),
            agent_id = %conn.agent_id(),
            conn_id = conn.conn_id(),
            "agent connected"
        );
        self.events.publish(ControlEvent::AgentOnline {
            token: token.to_owned(),
            agent_id: conn.agent_id().to_owned(),
        });
        Ok(conn)
    }

    /// Handle one inbound text frame from `conn`.
    ///
    /// Malformed frames are logged and dropped; they never end the connection.
    pub async fn handle_agent_text(&self, conn: &AgentConnection, text: &str) {
        self.registry.touch(conn.token(), conn.conn_id()).await;

        let msg = match decode_inbound(text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(
                    token = redact(conn.token()),
                    agent_id = %conn.agent_id(),
                    err = %e,
                    "discarding malformed agent envelope"
                );
                return;
            }
        };

        match msg {
            AgentMessage::AssignResult { request_id, payload } => {
                tracing::info!(
                    token = redact(conn.token()),
                    agent_id = %conn.agent_id(),
                    request_id = request_id.as_deref().unwrap_or("-"),
                    %payload,
                    "agent result"
                );
                if let Some(ref id) = request_id {
                    self.pending.complete(id, payload.clone());
                }
                self.events.publish(ControlEvent::AssignResult {
                    token: conn.token().to_owned(),
                    agent_id: conn.agent_id().to_owned(),
                    request_id,
                    payload,
                });
            }
            AgentMessage::Other { kind } => {
                tracing::debug!(agent_id = %conn.agent_id(), %kind, "ignoring agent envelope");
            }
        }
    }

    /// Cleanup for a channel that ended. No-op if it was already replaced.
    pub async fn connection_closed(&self, conn: &AgentConnection, reason: &str) {
        if let Some(removed) = self.registry.unbind(conn.token(), conn.conn_id()).await {
            tracing::info!(
                token = redact(removed.token()),
                agent_id = %removed.agent_id(),
                conn_id = removed.conn_id(),
                reason,
                "agent disconnected"
            );
            self.publish_offline(&removed, reason);
        }
    }

    /// Push an `assign_proxy` command to the agent bound to `token`.
    ///
    /// Returns once the command is queued on the channel. With `wait`, also
    /// waits (at most [`MAX_RESULT_WAIT`]) for the agent's correlated result.
    pub async fn dispatch(
        &self,
        token: &str,
        filters: serde_json::Value,
        wait: Option<Duration>,
    ) -> Result<Dispatched, DispatchError> {
        if token.is_empty() {
            return Err(DispatchError::MissingToken);
        }
        let filters = match filters {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            obj @ serde_json::Value::Object(_) => obj,
            _ => return Err(DispatchError::InvalidFilters),
        };

        let Some(conn) = self.registry.get_authorized(&self.credentials, token).await else {
            return Err(DispatchError::AgentOffline);
        };

        let request_id = uuid::Uuid::new_v4().to_string();
        let cmd = CommandEnvelope::AssignProxy { request_id: request_id.clone(), filters };

        // Register before sending so a fast reply cannot be missed.
        let waiter = wait.map(|_| self.pending.register(&request_id));

        if let Err(e) = conn.channel().send_command(&cmd) {
            drop(waiter);
            tracing::warn!(
                token = redact(token),
                agent_id = %conn.agent_id(),
                err = %e,
                "dispatch write failed"
            );
            if e == ChannelError::Closed {
                conn.channel().close(close::GOING_AWAY, "write failed");
                self.connection_closed(&conn, "write failed").await;
            }
            return Err(DispatchError::Write(e));
        }

        tracing::info!(
            token = redact(token),
            agent_id = %conn.agent_id(),
            request_id = cmd.request_id(),
            "dispatched assign_proxy"
        );

        let mut out = Dispatched {
            request_id,
            agent_id: conn.agent_id().to_owned(),
            result: None,
            timed_out: false,
        };
        if let (Some(wait), Some(waiter)) = (wait, waiter) {
            out.result = waiter.wait(wait.min(MAX_RESULT_WAIT)).await;
            out.timed_out = out.result.is_none();
        }
        Ok(out)
    }

    /// Evict idle connections (if an idle timeout is configured), evict
    /// connections whose credential expired, and prune expired credentials.
    /// Returns `(evicted, pruned)`.
    pub async fn sweep(&self) -> (usize, usize) {
        let mut evicted = 0;
        if let Some(idle) = self.config.idle_timeout() {
            for conn in self.registry.evict_idle(idle).await {
                tracing::info!(
                    token = redact(conn.token()),
                    agent_id = %conn.agent_id(),
                    idle_ms = idle.as_millis() as u64,
                    "evicting idle agent"
                );
                self.publish_offline(&conn, "idle timeout");
                evicted += 1;
            }
        }

        if self.config.token_ttl().is_none() {
            return (evicted, 0);
        }
        for conn in self.registry.evict_unauthorized(&self.credentials).await {
            tracing::info!(
                token = redact(conn.token()),
                agent_id = %conn.agent_id(),
                "evicting agent with expired token"
            );
            self.publish_offline(&conn, "token expired");
            evicted += 1;
        }

        let pruned = self.credentials.prune_expired().await;
        if pruned > 0 {
            tracing::debug!(pruned, "pruned expired tokens");
        }
        (evicted, pruned)
    }

    /// Close every agent channel for shutdown.
    pub async fn close_all(&self) {
        let closed = self.registry.close_all(close::GOING_AWAY, "server shutting down").await;
        if closed > 0 {
            tracing::info!(closed, "closed agent channels for shutdown");
        }
    }

    fn publish_offline(&self, conn: &AgentConnection, reason: &str) {
        self.events.publish(ControlEvent::AgentOffline {
            token: conn.token().to_owned(),
            agent_id: conn.agent_id().to_owned(),
            reason: reason.to_owned(),
        });
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;

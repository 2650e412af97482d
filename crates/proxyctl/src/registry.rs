// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection registry: the live agent channel bound to each token.
//!
//! At most one connection is bound per token. Binding a second channel
//! under the same token replaces the entry and closes the old channel in the
//! same critical section. Cleanup is keyed by `(token, conn_id)` so a
//! superseded channel tearing down never removes its successor.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::channel::{close, AgentChannel};
use crate::credential::{redact, Credential, CredentialStore};
use crate::state::epoch_ms;

/// A bound agent connection.
#[derive(Debug)]
pub struct AgentConnection {
    token: String,
    agent_id: String,
    channel: AgentChannel,
    connected_at: u64,
    last_seen: AtomicU64,
}

impl AgentConnection {
    fn new(token: String, agent_id: String, channel: AgentChannel) -> Self {
        let now = epoch_ms();
        Self { token, agent_id, channel, connected_at: now, last_seen: AtomicU64::new(now) }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn conn_id(&self) -> u64 {
        self.channel.conn_id()
    }

    /// Epoch millis of the last inbound frame.
    pub fn last_seen(&self) -> u64 {
        self.last_seen.load(Ordering::Relaxed)
    }

    /// Record inbound traffic.
    pub(crate) fn touch(&self) {
        self.last_seen.fetch_max(epoch_ms(), Ordering::Relaxed);
    }

    pub(crate) fn channel(&self) -> &AgentChannel {
        &self.channel
    }

    pub fn info(&self) -> AgentInfo {
        AgentInfo {
            token: self.token.clone(),
            agent_id: self.agent_id.clone(),
            last_seen: self.last_seen(),
            connected_at: self.connected_at,
        }
    }
}

/// Observability snapshot of one connection. Carries no channel handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub token: String,
    #[serde(rename = "agentID")]
    pub agent_id: String,
    /// Epoch millis.
    pub last_seen: u64,
    /// Epoch millis.
    pub connected_at: u64,
}

/// Why a bind was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindError {
    /// Token unknown, revoked, or expired.
    TokenInvalid,
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenInvalid => f.write_str("invalid token"),
        }
    }
}

impl std::error::Error for BindError {}

/// Result of a successful bind.
#[derive(Debug)]
pub struct Binding {
    pub connection: Arc<AgentConnection>,
    /// The previous connection for the same token, already closed.
    pub superseded: Option<Arc<AgentConnection>>,
}

/// Token → live connection table.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<String, Arc<AgentConnection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `token` and install `channel` as its connection.
    ///
    /// The credential check runs under the registry write lock, so a
    /// concurrent [`revoke`](Self::revoke) can never leave an orphaned bind.
    /// On error nothing is mutated and the caller still owns the channel.
    pub async fn bind(
        &self,
        credentials: &CredentialStore,
        token: &str,
        agent_id: String,
        channel: AgentChannel,
    ) -> Result<Binding, BindError> {
        let mut entries = self.entries.write().await;
        if credentials.lookup(token).await.is_none() {
            return Err(BindError::TokenInvalid);
        }

        let connection = Arc::new(AgentConnection::new(token.to_owned(), agent_id, channel));
        let superseded = entries.insert(token.to_owned(), Arc::clone(&connection));
        if let Some(ref old) = superseded {
            old.channel.close(close::SUPERSEDED, "superseded by a newer connection");
            tracing::info!(
                token = redact(token),
                old_agent_id = %old.agent_id,
                old_conn_id = old.conn_id(),
                new_conn_id = connection.conn_id(),
                "superseded agent connection"
            );
        }
        Ok(Binding { connection, superseded })
    }

    /// Update `lastSeen` for `token` if it is still bound to `conn_id`.
    pub async fn touch(&self, token: &str, conn_id: u64) -> bool {
        match self.entries.read().await.get(token) {
            Some(conn) if conn.conn_id() == conn_id => {
                conn.touch();
                true
            }
            _ => false,
        }
    }

    /// Remove the entry for `token` if it still belongs to `conn_id`.
    ///
    /// Idempotent: a missing or already-replaced entry is a no-op.
    pub async fn unbind(&self, token: &str, conn_id: u64) -> Option<Arc<AgentConnection>> {
        let mut entries = self.entries.write().await;
        if entries.get(token).is_some_and(|c| c.conn_id() == conn_id) {
            entries.remove(token)
        } else {
            None
        }
    }

    pub async fn get(&self, token: &str) -> Option<Arc<AgentConnection>> {
        self.entries.read().await.get(token).map(Arc::clone)
    }

    /// The connection bound to `token`, only while its credential still
    /// resolves. An expired binding the sweeper has not reached yet misses.
    pub async fn get_authorized(
        &self,
        credentials: &CredentialStore,
        token: &str,
    ) -> Option<Arc<AgentConnection>> {
        let entries = self.entries.read().await;
        let conn = entries.get(token)?;
        credentials.lookup(token).await?;
        Some(Arc::clone(conn))
    }

    /// Snapshot of all connections, oldest first.
    pub async fn list(&self) -> Vec<AgentInfo> {
        let entries = self.entries.read().await;
        let mut list: Vec<AgentInfo> = entries.values().map(|c| c.info()).collect();
        list.sort_by(|a, b| a.connected_at.cmp(&b.connected_at).then(a.token.cmp(&b.token)));
        list
    }

    /// Invalidate `token` and close whatever is bound to it.
    ///
    /// Both happen under the registry write lock, so no dispatch or bind can
    /// observe the credential gone while the connection is still listed.
    /// Returns `None` when the token was not known.
    pub async fn revoke(
        &self,
        credentials: &CredentialStore,
        token: &str,
    ) -> Option<(Credential, Option<Arc<AgentConnection>>)> {
        let mut entries = self.entries.write().await;
        let cred = credentials.invalidate(token).await?;
        let removed = entries.remove(token);
        if let Some(ref conn) = removed {
            conn.channel.close(close::REVOKED, "token revoked");
        }
        Some((cred, removed))
    }

    /// Remove and close every connection whose credential no longer resolves.
    pub async fn evict_unauthorized(
        &self,
        credentials: &CredentialStore,
    ) -> Vec<Arc<AgentConnection>> {
        let mut entries = self.entries.write().await;
        let mut stale = Vec::new();
        for token in entries.keys() {
            if credentials.lookup(token).await.is_none() {
                stale.push(token.clone());
            }
        }

        let mut evicted = Vec::with_capacity(stale.len());
        for token in stale {
            if let Some(conn) = entries.remove(&token) {
                conn.channel.close(close::REVOKED, "token expired");
                evicted.push(conn);
            }
        }
        evicted
    }

    /// Remove and close every connection silent for longer than `idle`.
    pub async fn evict_idle(&self, idle: Duration) -> Vec<Arc<AgentConnection>> {
        let cutoff = epoch_ms().saturating_sub(idle.as_millis() as u64);
        let mut entries = self.entries.write().await;
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, c)| c.last_seen() < cutoff)
            .map(|(token, _)| token.clone())
            .collect();

        let mut evicted = Vec::with_capacity(stale.len());
        for token in stale {
            if let Some(conn) = entries.remove(&token) {
                conn.channel.close(close::IDLE_TIMEOUT, "idle timeout");
                evicted.push(conn);
            }
        }
        evicted
    }

    /// Close and drop every connection.
    pub async fn close_all(&self, code: u16, reason: &str) -> usize {
        let mut entries = self.entries.write().await;
        for conn in entries.values() {
            conn.channel.close(code, reason);
        }
        let count = entries.len();
        entries.clear();
        count
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

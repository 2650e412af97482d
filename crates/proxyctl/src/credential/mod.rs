// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential store: one-time agent tokens minted for front-end owners.
//!
//! A token authorizes an agent to bind its persistent channel. Tokens are
//! random, never mutated after issue, and live until revoked or (when a TTL
//! is configured) until they expire. Optionally mirrored to a JSON file so
//! issued tokens survive a restart.

pub mod persist;

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::credential::persist::PersistedCredentials;
use crate::state::epoch_ms;

/// Random bytes per token (192 bits, hex encoded to 48 chars).
const TOKEN_BYTES: usize = 24;

/// Attempts before giving up on finding an unused token.
const MAX_ISSUE_ATTEMPTS: usize = 4;

/// An issued agent credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub token: String,
    #[serde(rename = "ownerID")]
    pub owner_id: String,
    /// Epoch millis.
    pub issued_at: u64,
    /// Epoch millis; `None` never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl Credential {
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        self.expires_at.is_some_and(|at| now_ms >= at)
    }
}

/// The system entropy source failed to produce a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntropyError;

impl fmt::Display for EntropyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("entropy source unavailable")
    }
}

impl std::error::Error for EntropyError {}

/// Generate a fresh hex-encoded token from `rng`.
pub fn generate_token<R: SecureRandom + ?Sized>(rng: &R) -> Result<String, EntropyError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    rng.fill(&mut bytes).map_err(|_| EntropyError)?;
    let mut token = String::with_capacity(TOKEN_BYTES * 2);
    for b in bytes {
        let _ = write!(token, "{b:02x}");
    }
    Ok(token)
}

/// Short token prefix for log fields. Full tokens are never logged.
pub fn redact(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

/// In-memory credential table with optional file persistence.
pub struct CredentialStore {
    credentials: RwLock<HashMap<String, Credential>>,
    rng: SystemRandom,
    ttl: Option<Duration>,
    persist_path: Option<PathBuf>,
}

impl CredentialStore {
    pub fn new(ttl: Option<Duration>, persist_path: Option<PathBuf>) -> Self {
        Self {
            credentials: RwLock::new(HashMap::new()),
            rng: SystemRandom::new(),
            ttl,
            persist_path,
        }
    }

    /// Load persisted credentials, dropping any that already expired.
    ///
    /// A missing file is not an error. Returns the number of credentials restored.
    pub async fn load(&self) -> anyhow::Result<usize> {
        let Some(ref path) = self.persist_path else {
            return Ok(0);
        };
        if !path.exists() {
            return Ok(0);
        }
        let persisted = persist::load(path)?;
        let now = epoch_ms();
        let mut credentials = self.credentials.write().await;
        for cred in persisted.credentials {
            if !cred.is_expired_at(now) {
                credentials.insert(cred.token.clone(), cred);
            }
        }
        Ok(credentials.len())
    }

    /// Mint a new token for `owner_id`.
    ///
    /// Every call yields a distinct token, even for the same owner.
    pub async fn issue(&self, owner_id: &str) -> Result<Credential, EntropyError> {
        let mut credentials = self.credentials.write().await;

        let mut token = generate_token(&self.rng)?;
        let mut attempts = 1;
        while credentials.contains_key(&token) {
            if attempts >= MAX_ISSUE_ATTEMPTS {
                return Err(EntropyError);
            }
            token = generate_token(&self.rng)?;
            attempts += 1;
        }

        let issued_at = epoch_ms();
        let cred = Credential {
            token: token.clone(),
            owner_id: owner_id.to_owned(),
            issued_at,
            expires_at: self.ttl.map(|ttl| issued_at.saturating_add(ttl.as_millis() as u64)),
        };
        credentials.insert(token, cred.clone());
        self.persist(&credentials);
        Ok(cred)
    }

    /// Look up a currently valid credential. Expired credentials miss.
    pub async fn lookup(&self, token: &str) -> Option<Credential> {
        let credentials = self.credentials.read().await;
        credentials.get(token).filter(|c| !c.is_expired_at(epoch_ms())).cloned()
    }

    /// Remove a credential, returning it if it existed.
    pub async fn invalidate(&self, token: &str) -> Option<Credential> {
        let mut credentials = self.credentials.write().await;
        let removed = credentials.remove(token);
        if removed.is_some() {
            self.persist(&credentials);
        }
        removed
    }

    /// Drop every expired credential. Returns how many were removed.
    pub async fn prune_expired(&self) -> usize {
        let now = epoch_ms();
        let mut credentials = self.credentials.write().await;
        let before = credentials.len();
        credentials.retain(|_, c| !c.is_expired_at(now));
        let pruned = before - credentials.len();
        if pruned > 0 {
            self.persist(&credentials);
        }
        pruned
    }

    /// All valid credentials issued to `owner_id`, oldest first.
    pub async fn tokens_for(&self, owner_id: &str) -> Vec<Credential> {
        let now = epoch_ms();
        let credentials = self.credentials.read().await;
        let mut owned: Vec<Credential> = credentials
            .values()
            .filter(|c| c.owner_id == owner_id && !c.is_expired_at(now))
            .cloned()
            .collect();
        owned.sort_by_key(|c| c.issued_at);
        owned
    }

    pub async fn len(&self) -> usize {
        self.credentials.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.credentials.read().await.is_empty()
    }

    /// Write the table to disk if persistence is configured.
    ///
    /// Called with the write guard held so saves are serialized.
    fn persist(&self, credentials: &HashMap<String, Credential>) {
        let Some(ref path) = self.persist_path else {
            return;
        };
        let mut persisted =
            PersistedCredentials { credentials: credentials.values().cloned().collect() };
        persisted.credentials.sort_by_key(|c| c.issued_at);
        if let Err(e) = persist::save(path, &persisted) {
            tracing::warn!(err = %e, "failed to persist credentials");
        }
    }
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;

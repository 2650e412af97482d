// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio_util::sync::CancellationToken;

use crate::config::ControlConfig;
use crate::credential::CredentialStore;
use crate::events::EventHub;
use crate::registry::ConnectionRegistry;
use crate::service::PendingResults;

/// Shared control-plane state. Operations live in [`crate::service`].
pub struct ControlState {
    pub config: ControlConfig,
    pub credentials: CredentialStore,
    pub registry: ConnectionRegistry,
    pub events: EventHub,
    /// Dispatches waiting for a correlated `assign_result`.
    pub pending: PendingResults,
    pub shutdown: CancellationToken,
}

impl ControlState {
    pub fn new(config: ControlConfig, shutdown: CancellationToken) -> Self {
        let credentials = CredentialStore::new(config.token_ttl(), config.credentials_path());
        Self {
            config,
            credentials,
            registry: ConnectionRegistry::new(),
            events: EventHub::default(),
            pending: PendingResults::default(),
            shutdown,
        }
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Log output format for the binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Configuration for the proxy control plane.
#[derive(Debug, Clone, clap::Args)]
pub struct ControlConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "PROXYCTL_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 3000, env = "PROXYCTL_PORT")]
    pub port: u16,

    /// Base URL agents use to reach this server. Defaults to `http://{host}:{port}`.
    #[arg(long, env = "PROXYCTL_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Credential lifetime in seconds for binding new agents (0 = never expires).
    #[arg(long, default_value_t = 0, env = "PROXYCTL_TOKEN_TTL_SECS")]
    pub token_ttl_secs: u64,

    /// Evict agent connections silent for this many milliseconds (0 = disabled).
    #[arg(long, default_value_t = 0, env = "PROXYCTL_IDLE_TIMEOUT_MS")]
    pub idle_timeout_ms: u64,

    /// WebSocket ping interval toward agents in milliseconds (0 = disabled).
    #[arg(long, default_value_t = 30000, env = "PROXYCTL_PING_INTERVAL_MS")]
    pub ping_interval_ms: u64,

    /// Idle/expiry sweep interval in milliseconds.
    #[arg(long, default_value_t = 5000, env = "PROXYCTL_SWEEP_INTERVAL_MS")]
    pub sweep_interval_ms: u64,

    /// Outbound queue depth per agent channel.
    #[arg(long, default_value_t = 64, env = "PROXYCTL_CHANNEL_DEPTH")]
    pub channel_depth: usize,

    /// Directory for persisted credentials. Credentials are in-memory only if unset.
    #[arg(long, env = "PROXYCTL_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "PROXYCTL_LOG_FORMAT")]
    pub log_format: LogFormat,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 3000,
            public_url: None,
            token_ttl_secs: 0,
            idle_timeout_ms: 0,
            ping_interval_ms: 30000,
            sweep_interval_ms: 5000,
            channel_depth: 64,
            state_dir: None,
            log_format: LogFormat::Text,
        }
    }
}

impl ControlConfig {
    pub fn token_ttl(&self) -> Option<Duration> {
        non_zero(Duration::from_secs(self.token_ttl_secs))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        non_zero(Duration::from_millis(self.idle_timeout_ms))
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        non_zero(Duration::from_millis(self.ping_interval_ms))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(10))
    }

    /// Path of the persisted credential file, if persistence is enabled.
    pub fn credentials_path(&self) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|dir| dir.join("credentials.json"))
    }

    /// Base URL advertised to agents, without a trailing slash.
    pub fn public_base_url(&self) -> String {
        match self.public_url {
            Some(ref url) => url.trim_end_matches('/').to_owned(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    /// Agent-facing WebSocket URL for the given credential.
    pub fn agent_ws_url(&self, token: &str) -> String {
        let base = self.public_base_url();
        let ws_base = if base.starts_with("https://") {
            base.replacen("https://", "wss://", 1)
        } else {
            base.replacen("http://", "ws://", 1)
        };
        format!("{ws_base}/ws?token={token}")
    }
}

fn non_zero(d: Duration) -> Option<Duration> {
    if d.is_zero() {
        None
    } else {
        Some(d)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

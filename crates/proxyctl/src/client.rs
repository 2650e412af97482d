// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for front ends talking to the control plane.
//!
//! "Agent offline" and other 4xx outcomes come back as JSON values rather
//! than errors; only transport failures and 5xx responses are `Err`.

use std::time::Duration;

use reqwest::{Client, Response};
use serde_json::json;

/// Install the ring crypto provider for rustls. Safe to call repeatedly.
pub fn ensure_crypto() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Client for one control-plane server.
pub struct ControlClient {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl ControlClient {
    /// `api_key` is sent as a bearer token for front ends that sit behind an
    /// authenticating gateway; the control plane itself does not check it.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> anyhow::Result<Self> {
        ensure_crypto();
        let client = Client::builder().timeout(Duration::from_secs(40)).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { base_url, api_key, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    /// `POST /create-token`
    pub async fn create_token(&self, owner_id: &str) -> anyhow::Result<serde_json::Value> {
        let req = self.client.post(self.url("/create-token")).json(&json!({ "ownerID": owner_id }));
        read_body(self.apply_auth(req).send().await?).await
    }

    /// `POST /assign-proxy`. With `wait`, the server holds the request until
    /// the agent answers or the wait elapses.
    pub async fn assign_proxy(
        &self,
        token: &str,
        filters: serde_json::Value,
        wait: Option<Duration>,
    ) -> anyhow::Result<serde_json::Value> {
        let mut body = json!({ "token": token, "filters": filters });
        if let Some(wait) = wait {
            body["wait_ms"] = json!(wait.as_millis() as u64);
        }
        let req = self.client.post(self.url("/assign-proxy")).json(&body);
        read_body(self.apply_auth(req).send().await?).await
    }

    /// `GET /agents`
    pub async fn list_agents(&self) -> anyhow::Result<serde_json::Value> {
        let req = self.client.get(self.url("/agents"));
        read_body(self.apply_auth(req).send().await?).await
    }

    /// `DELETE /tokens/{token}`
    pub async fn revoke_token(&self, token: &str) -> anyhow::Result<serde_json::Value> {
        let req = self.client.delete(self.url(&format!("/tokens/{token}")));
        read_body(self.apply_auth(req).send().await?).await
    }

    /// `GET /health`
    pub async fn health(&self) -> anyhow::Result<serde_json::Value> {
        let resp = self.client.get(self.url("/health")).send().await?;
        Ok(resp.error_for_status()?.json().await?)
    }
}

async fn read_body(resp: Response) -> anyhow::Result<serde_json::Value> {
    let status = resp.status();
    if status.is_server_error() {
        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!("control server returned {status}: {text}");
    }
    let bytes = resp.bytes().await?;
    if bytes.is_empty() {
        return Ok(serde_json::Value::Null);
    }
    Ok(serde_json::from_slice(&bytes)?)
}

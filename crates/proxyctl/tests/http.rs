// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the control-plane HTTP API.
//!
//! Uses `axum_test::TestServer`, no real TCP needed.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use proxyctl::channel::{close, AgentChannel};
use proxyctl::config::ControlConfig;
use proxyctl::state::ControlState;
use proxyctl::transport::build_router;

fn test_state() -> Arc<ControlState> {
    let config = ControlConfig { port: 0, ping_interval_ms: 0, ..Default::default() };
    Arc::new(ControlState::new(config, CancellationToken::new()))
}

fn test_server(state: Arc<ControlState>) -> anyhow::Result<TestServer> {
    TestServer::new(build_router(state))
}

#[tokio::test]
async fn health_reports_counts() -> anyhow::Result<()> {
    let state = test_state();
    state.issue_token("u1").await?;

    let server = test_server(state)?;
    let resp = server.get("/health").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "running");
    assert_eq!(body["agents"], 0);
    assert_eq!(body["tokens"], 1);
    Ok(())
}

#[tokio::test]
async fn create_token_returns_201() -> anyhow::Result<()> {
    let state = test_state();
    let server = test_server(Arc::clone(&state))?;

    let resp = server.post("/create-token").json(&json!({ "ownerID": "u1" })).await;
    resp.assert_status(StatusCode::CREATED);

    let body: serde_json::Value = resp.json();
    let token = body["token"].as_str().unwrap_or_default();
    assert_eq!(token.len(), 48);
    assert_eq!(body["ownerID"], "u1");
    assert!(body["issuedAt"].as_u64().is_some());
    assert!(body.get("expiresAt").is_none());
    let cmd = body["exampleAgentCommand"].as_str().unwrap_or_default();
    assert!(cmd.contains(&format!("AGENT_TOKEN={token}")));
    assert!(cmd.contains(&format!("ws://127.0.0.1:0/ws?token={token}")));

    assert!(state.credentials.lookup(token).await.is_some());
    Ok(())
}

#[yare::parameterized(
    owner_id_camel = { "ownerId" },
    owner_id_snake = { "owner_id" },
    discord_id = { "discordId" },
)]
#[test_macro(tokio::test)]
async fn create_token_accepts_owner_aliases(field: &str) -> anyhow::Result<()> {
    let server = test_server(test_state())?;
    let mut body = serde_json::Map::new();
    body.insert(field.to_owned(), json!("u7"));
    let resp = server.post("/create-token").json(&body).await;
    resp.assert_status(StatusCode::CREATED);
    assert_eq!(resp.json::<serde_json::Value>()["ownerID"], "u7");
    Ok(())
}

#[tokio::test]
async fn create_token_distinct_per_call() -> anyhow::Result<()> {
    let server = test_server(test_state())?;
    let a: serde_json::Value =
        server.post("/create-token").json(&json!({ "ownerID": "u1" })).await.json();
    let b: serde_json::Value =
        server.post("/create-token").json(&json!({ "ownerID": "u1" })).await.json();
    assert_ne!(a["token"], b["token"]);
    Ok(())
}

#[tokio::test]
async fn create_token_requires_owner() -> anyhow::Result<()> {
    let state = test_state();
    let server = test_server(Arc::clone(&state))?;

    let resp = server.post("/create-token").json(&json!({})).await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"], "ownerID required");
    assert_eq!(body["code"], "BAD_REQUEST");

    let resp = server.post("/create-token").json(&json!({ "ownerID": "" })).await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    // No JSON body at all.
    let resp = server.post("/create-token").await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    assert!(state.credentials.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn assign_proxy_requires_token() -> anyhow::Result<()> {
    let server = test_server(test_state())?;

    let resp = server.post("/assign-proxy").json(&json!({ "filters": {} })).await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(resp.json::<serde_json::Value>()["error"], "token required");
    Ok(())
}

#[tokio::test]
async fn assign_proxy_unknown_token_is_agent_offline() -> anyhow::Result<()> {
    let server = test_server(test_state())?;

    let resp = server.post("/assign-proxy").json(&json!({ "token": "nope", "filters": {} })).await;
    resp.assert_status(StatusCode::NOT_FOUND);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"], "agent offline");
    assert_eq!(body["code"], "AGENT_OFFLINE");
    Ok(())
}

#[tokio::test]
async fn assign_proxy_issued_but_unconnected_is_agent_offline() -> anyhow::Result<()> {
    let state = test_state();
    let token = state.issue_token("u1").await?.token;
    let server = test_server(state)?;

    let resp = server.post("/assign-proxy").json(&json!({ "token": token })).await;
    resp.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(resp.json::<serde_json::Value>()["error"], "agent offline");
    Ok(())
}

#[tokio::test]
async fn assign_proxy_rejects_non_object_filters() -> anyhow::Result<()> {
    let server = test_server(test_state())?;

    let resp =
        server.post("/assign-proxy").json(&json!({ "token": "t", "filters": ["EU"] })).await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(resp.json::<serde_json::Value>()["error"], "filters must be an object");
    Ok(())
}

#[tokio::test]
async fn assign_proxy_delivers_to_bound_channel() -> anyhow::Result<()> {
    let state = test_state();
    let token = state.issue_token("u1").await?.token;
    let (chan, mut rx) = AgentChannel::new(8);
    state.accept_connection(&token, Some("a1".to_owned()), chan).await?;
    let server = test_server(state)?;

    let resp = server
        .post("/assign-proxy")
        .json(&json!({ "token": token, "filters": { "region": "EU" } }))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["ok"], true);
    assert_eq!(body["agentID"], "a1");
    assert!(body.get("result").is_none());
    assert!(body.get("timed_out").is_none());

    let Ok(axum::extract::ws::Message::Text(text)) = rx.try_recv() else {
        anyhow::bail!("expected one queued command");
    };
    let cmd: serde_json::Value = serde_json::from_str(text.as_str())?;
    assert_eq!(cmd["type"], "assign_proxy");
    assert_eq!(cmd["filters"], json!({ "region": "EU" }));
    assert_eq!(cmd["request_id"], body["request_id"]);
    assert!(rx.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn assign_proxy_closed_channel_is_500_then_offline() -> anyhow::Result<()> {
    let state = test_state();
    let token = state.issue_token("u1").await?.token;
    let (chan, rx) = AgentChannel::new(8);
    state.accept_connection(&token, Some("a1".to_owned()), chan).await?;
    drop(rx);
    let server = test_server(Arc::clone(&state))?;

    let resp = server.post("/assign-proxy").json(&json!({ "token": token })).await;
    resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.json::<serde_json::Value>()["code"], "TRANSPORT_WRITE");

    let resp = server.post("/assign-proxy").json(&json!({ "token": token })).await;
    resp.assert_status(StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn agents_lists_connections() -> anyhow::Result<()> {
    let state = test_state();
    let server = test_server(Arc::clone(&state))?;

    let list: Vec<serde_json::Value> = server.get("/agents").await.json();
    assert!(list.is_empty());

    let token = state.issue_token("u1").await?.token;
    let (chan, _rx) = AgentChannel::new(8);
    state.accept_connection(&token, Some("a1".to_owned()), chan).await?;

    let list: Vec<serde_json::Value> = server.get("/agents").await.json();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["token"], token.as_str());
    assert_eq!(list[0]["agentID"], "a1");
    assert!(list[0]["lastSeen"].as_u64().is_some());
    assert!(list[0].get("channel").is_none());
    Ok(())
}

#[tokio::test]
async fn revoke_token_closes_agent() -> anyhow::Result<()> {
    let state = test_state();
    let token = state.issue_token("u1").await?.token;
    let (chan, _rx) = AgentChannel::new(8);
    state.accept_connection(&token, Some("a1".to_owned()), chan.clone()).await?;
    let server = test_server(Arc::clone(&state))?;

    let resp = server.delete(&format!("/tokens/{token}")).await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["revoked"], true);
    assert_eq!(body["ownerID"], "u1");

    assert_eq!(chan.pending_close().map(|f| f.code), Some(close::REVOKED));
    assert!(state.registry.is_empty().await);

    let resp = server.delete(&format!("/tokens/{token}")).await;
    resp.assert_status(StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn tokens_filtered_by_owner() -> anyhow::Result<()> {
    let state = test_state();
    state.issue_token("u1").await?;
    state.issue_token("u1").await?;
    state.issue_token("u2").await?;
    let server = test_server(state)?;

    let list: Vec<serde_json::Value> = server.get("/tokens?ownerID=u1").await.json();
    assert_eq!(list.len(), 2);
    assert!(list.iter().all(|c| c["ownerID"] == "u1"));

    let resp = server.get("/tokens").await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}

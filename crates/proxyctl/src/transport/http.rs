// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the front-end surface.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::credential::Credential;
use crate::error::ControlError;
use crate::state::ControlState;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub agents: usize,
    pub tokens: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateTokenRequest {
    #[serde(default, rename = "ownerID", alias = "ownerId", alias = "owner_id", alias = "discordId")]
    pub owner_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenResponse {
    #[serde(flatten)]
    pub credential: Credential,
    pub example_agent_command: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssignProxyRequest {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub filters: Option<serde_json::Value>,
    /// Wait this long for the agent's correlated `assign_result`.
    #[serde(default)]
    pub wait_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssignProxyResponse {
    pub ok: bool,
    pub request_id: String,
    #[serde(rename = "agentID")]
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub timed_out: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RevokeResponse {
    pub revoked: bool,
    #[serde(rename = "ownerID")]
    pub owner_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TokensQuery {
    #[serde(rename = "ownerID", alias = "ownerId", alias = "owner_id")]
    pub owner_id: Option<String>,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /health`
pub async fn health(State(s): State<Arc<ControlState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        agents: s.registry.len().await,
        tokens: s.credentials.len().await,
    })
}

/// `POST /create-token`: mint a credential for a front-end user.
pub async fn create_token(
    State(s): State<Arc<ControlState>>,
    body: Result<Json<CreateTokenRequest>, JsonRejection>,
) -> impl IntoResponse {
    let req = match body {
        Ok(Json(req)) => req,
        Err(e) => return ControlError::BadRequest.to_http_response(e.body_text()).into_response(),
    };
    let Some(owner_id) = req.owner_id.filter(|id| !id.trim().is_empty()) else {
        return ControlError::BadRequest.to_http_response("ownerID required").into_response();
    };

    match s.issue_token(&owner_id).await {
        Ok(credential) => {
            let example_agent_command = format!(
                "AGENT_TOKEN={} CONTROL_WS={} node agent.js",
                credential.token,
                s.config.agent_ws_url(&credential.token)
            );
            (StatusCode::CREATED, Json(CreateTokenResponse { credential, example_agent_command }))
                .into_response()
        }
        Err(e) => ControlError::Internal.to_http_response(e.to_string()).into_response(),
    }
}

/// `POST /assign-proxy`: push an `assign_proxy` command to a connected agent.
pub async fn assign_proxy(
    State(s): State<Arc<ControlState>>,
    body: Result<Json<AssignProxyRequest>, JsonRejection>,
) -> impl IntoResponse {
    let req = match body {
        Ok(Json(req)) => req,
        Err(e) => return ControlError::BadRequest.to_http_response(e.body_text()).into_response(),
    };
    let token = req.token.unwrap_or_default();
    let filters = req.filters.unwrap_or(serde_json::Value::Null);
    let wait = req.wait_ms.map(Duration::from_millis);

    match s.dispatch(&token, filters, wait).await {
        Ok(out) => Json(AssignProxyResponse {
            ok: true,
            request_id: out.request_id,
            agent_id: out.agent_id,
            result: out.result,
            timed_out: out.timed_out,
        })
        .into_response(),
        Err(e) => e.code().to_http_response(e.to_string()).into_response(),
    }
}

/// `GET /agents`: snapshot of connected agents.
pub async fn list_agents(State(s): State<Arc<ControlState>>) -> impl IntoResponse {
    Json(s.registry.list().await)
}

/// `GET /tokens?ownerID=`: credentials issued to one owner.
pub async fn list_tokens(
    State(s): State<Arc<ControlState>>,
    Query(query): Query<TokensQuery>,
) -> impl IntoResponse {
    let Some(owner_id) = query.owner_id.filter(|id| !id.is_empty()) else {
        return ControlError::BadRequest.to_http_response("ownerID required").into_response();
    };
    Json(s.credentials.tokens_for(&owner_id).await).into_response()
}

/// `DELETE /tokens/{token}`: revoke a credential and drop its agent.
pub async fn revoke_token(
    State(s): State<Arc<ControlState>>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    match s.revoke_token(&token).await {
        Some(cred) => Json(RevokeResponse { revoked: true, owner_id: cred.owner_id }).into_response(),
        None => ControlError::NotFound.to_http_response("token not found").into_response(),
    }
}

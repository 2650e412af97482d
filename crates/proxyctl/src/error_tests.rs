// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;

use super::ControlError;

#[yare::parameterized(
    bad_request = { ControlError::BadRequest, 400, "BAD_REQUEST" },
    agent_offline = { ControlError::AgentOffline, 404, "AGENT_OFFLINE" },
    not_found = { ControlError::NotFound, 404, "NOT_FOUND" },
    transport_write = { ControlError::TransportWrite, 500, "TRANSPORT_WRITE" },
    internal = { ControlError::Internal, 500, "INTERNAL" },
)]
fn status_and_code(err: ControlError, status: u16, code: &str) {
    assert_eq!(err.http_status(), status);
    assert_eq!(err.as_str(), code);
    assert_eq!(err.to_string(), code);
}

#[test]
fn agent_offline_body_shape() -> anyhow::Result<()> {
    let (status, body) = ControlError::AgentOffline.to_http_response("agent offline");
    assert_eq!(status, StatusCode::NOT_FOUND);
    let json = serde_json::to_value(&body.0)?;
    assert_eq!(json["error"], "agent offline");
    assert_eq!(json["code"], "AGENT_OFFLINE");
    Ok(())
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for the control-plane API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlError {
    BadRequest,
    AgentOffline,
    NotFound,
    TransportWrite,
    Internal,
}

impl ControlError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::AgentOffline => 404,
            Self::NotFound => 404,
            Self::TransportWrite => 500,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::AgentOffline => "AGENT_OFFLINE",
            Self::NotFound => "NOT_FOUND",
            Self::TransportWrite => "TRANSPORT_WRITE",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_error_response(&self, message: impl Into<String>) -> ErrorResponse {
        ErrorResponse { error: message.into(), code: self.as_str().to_owned() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_error_response(message)))
    }
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error response body: human-readable `error` plus a machine-readable `code`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

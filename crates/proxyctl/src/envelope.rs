// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-channel envelopes exchanged with agents.
//!
//! Down: `{"type":"assign_proxy","request_id":"…","filters":{…}}`.
//! Up: `{"type":"assign_result","request_id":"…","payload":…}`. The payload
//! is opaque; agents that put their result fields at the top level instead
//! of under `payload` are accepted too.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Server-to-agent command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandEnvelope {
    AssignProxy { request_id: String, filters: serde_json::Value },
}

impl CommandEnvelope {
    pub fn request_id(&self) -> &str {
        match self {
            Self::AssignProxy { request_id, .. } => request_id,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Agent-to-server message after decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    AssignResult { request_id: Option<String>, payload: serde_json::Value },
    /// A well-formed envelope of a type this server does not handle.
    Other { kind: String },
}

/// Inbound text that is not a typed JSON envelope.
#[derive(Debug)]
pub enum EnvelopeError {
    Json(serde_json::Error),
    MissingType,
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(e) => write!(f, "invalid json: {e}"),
            Self::MissingType => f.write_str("missing string field `type`"),
        }
    }
}

impl std::error::Error for EnvelopeError {}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: Option<serde_json::Value>,
    #[serde(default)]
    request_id: Option<serde_json::Value>,
    #[serde(default)]
    payload: Option<serde_json::Value>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

/// Decode one inbound text frame.
pub fn decode_inbound(text: &str) -> Result<AgentMessage, EnvelopeError> {
    let raw: RawEnvelope = serde_json::from_str(text).map_err(EnvelopeError::Json)?;
    let kind = match raw.kind {
        Some(serde_json::Value::String(kind)) => kind,
        _ => return Err(EnvelopeError::MissingType),
    };

    match kind.as_str() {
        "assign_result" => {
            // Agents may echo the id as a number.
            let request_id = raw.request_id.and_then(|v| match v {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
            let payload = match raw.payload {
                Some(payload) => payload,
                None => serde_json::Value::Object(raw.rest),
            };
            Ok(AgentMessage::AssignResult { request_id, payload })
        }
        _ => Ok(AgentMessage::Other { kind }),
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;

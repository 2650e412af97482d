// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane events fanned out to observers (`/ws/events`).
//!
//! Agent results are the main payload here: dispatch is fire-and-forget, so
//! a front end that wants to relay an `assign_result` back to its user
//! subscribes to this stream.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted by the control service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlEvent {
    TokenIssued {
        owner_id: String,
    },
    TokenRevoked {
        owner_id: String,
    },
    AgentOnline {
        token: String,
        agent_id: String,
    },
    AgentOffline {
        token: String,
        agent_id: String,
        reason: String,
    },
    AssignResult {
        token: String,
        agent_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        payload: serde_json::Value,
    },
}

impl ControlEvent {
    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TokenIssued { .. } => "token_issued",
            Self::TokenRevoked { .. } => "token_revoked",
            Self::AgentOnline { .. } => "agent_online",
            Self::AgentOffline { .. } => "agent_offline",
            Self::AssignResult { .. } => "assign_result",
        }
    }
}

/// Broadcast hub for [`ControlEvent`]s.
pub struct EventHub {
    tx: broadcast::Sender<ControlEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControlEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers. Having none is fine.
    pub fn publish(&self, event: ControlEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Event-type filter for an observer connection.
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// `None` = all types.
    kinds: Option<HashSet<String>>,
}

impl EventFilter {
    /// Parse a comma-separated type list; empty or `all` accepts everything.
    pub fn new(types: &str) -> Self {
        let kinds: HashSet<String> = types
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        if kinds.is_empty() || kinds.contains("all") {
            Self { kinds: None }
        } else {
            Self { kinds: Some(kinds) }
        }
    }

    pub fn wants(&self, event: &ControlEvent) -> bool {
        match self.kinds {
            Some(ref kinds) => kinds.contains(event.kind()),
            None => true,
        }
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;

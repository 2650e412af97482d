// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write side of one agent's persistent channel.
//!
//! The socket itself is owned by the connection task in `transport::ws`; the
//! registry holds this handle, which only enqueues frames. Every write is a
//! `try_send`, so callers never wait on a slow agent.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use axum::extract::ws::{CloseFrame, Message};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::envelope::CommandEnvelope;

/// Close codes sent to agents.
pub mod close {
    /// Token unknown or expired at handshake.
    pub const INVALID_TOKEN: u16 = 4003;
    /// A newer connection bound the same token.
    pub const SUPERSEDED: u16 = 4001;
    /// No inbound traffic within the idle timeout.
    pub const IDLE_TIMEOUT: u16 = 4002;
    /// The credential was revoked while connected.
    pub const REVOKED: u16 = 4004;
    /// Server shutting down.
    pub const GOING_AWAY: u16 = 1001;
}

/// Next process-unique connection id.
pub fn next_conn_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Failure to enqueue a frame on an agent channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// The connection task is gone.
    Closed,
    /// The outbound queue is full; the agent is not draining it.
    Backlogged,
    /// The command could not be serialized.
    Encode,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("agent channel closed"),
            Self::Backlogged => f.write_str("agent channel backlogged"),
            Self::Encode => f.write_str("failed to encode command"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Handle to a live agent channel.
#[derive(Debug, Clone)]
pub struct AgentChannel {
    conn_id: u64,
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
    /// First close request wins.
    closing: Arc<OnceLock<CloseFrame>>,
}

impl AgentChannel {
    /// Create a handle plus the receiver the connection task drains into the socket.
    pub fn new(depth: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        let chan = Self {
            conn_id: next_conn_id(),
            tx,
            cancel: CancellationToken::new(),
            closing: Arc::new(OnceLock::new()),
        };
        (chan, rx)
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Cancelled once the channel has been closed by the server side.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Enqueue a command for the agent.
    pub fn send_command(&self, cmd: &CommandEnvelope) -> Result<(), ChannelError> {
        let text = cmd.encode().map_err(|_| ChannelError::Encode)?;
        self.send(Message::Text(text.into()))
    }

    fn send(&self, msg: Message) -> Result<(), ChannelError> {
        if self.cancel.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ChannelError::Backlogged,
            mpsc::error::TrySendError::Closed(_) => ChannelError::Closed,
        })
    }

    /// Close the channel with `code`. Non-blocking.
    ///
    /// Commands already queued are still flushed by the connection task
    /// before it sends the close frame; later sends fail with `Closed`.
    pub fn close(&self, code: u16, reason: &str) {
        if self.closing.set(close_frame(code, reason)).is_ok() {
            tracing::debug!(conn_id = self.conn_id, code, reason, "closing agent channel");
        }
        self.cancel.cancel();
    }

    /// The close frame requested via [`AgentChannel::close`], if any.
    pub fn pending_close(&self) -> Option<CloseFrame> {
        self.closing.get().cloned()
    }
}

/// Build a close frame, truncating the reason to the protocol limit.
pub fn close_frame(code: u16, reason: &str) -> CloseFrame {
    let reason: String = reason.chars().take(123).collect();
    CloseFrame { code, reason: reason.into() }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;

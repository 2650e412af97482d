// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background sweep for idle agents and expired credentials.

use std::sync::Arc;

use crate::state::ControlState;

/// Spawn a single background task that periodically runs [`ControlState::sweep`].
pub fn spawn_sweeper(state: Arc<ControlState>) -> tokio::task::JoinHandle<()> {
    let interval = state.config.sweep_interval();

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            let (evicted, pruned) = state.sweep().await;
            if evicted > 0 || pruned > 0 {
                tracing::debug!(evicted, pruned, "sweep complete");
            }
        }
    })
}

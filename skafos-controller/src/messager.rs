//! The fan-out messaging tick: every `MESSAGER_INTERVAL`, drains the rule
//! buffer and the proxy buffer concurrently against each other
//! (`tokio::join!`). Within each buffer, every non-empty agent slot is
//! dispatched as its own concurrent delivery task and all of them are
//! joined, under that buffer's own lock, before the next tick starts —
//! see `RuleBuffer::flush`/`ProxyBuffer::flush`.

use std::time::Duration;

use crate::pilot::ControllerState;

pub const MESSAGER_INTERVAL: Duration = Duration::from_secs(8);

pub async fn run(state: &ControllerState, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        probe_and_message(state).await;
    }
}

/// Runs a single flush wave over both buffers: the rule buffer and the
/// proxy buffer flush concurrently against each other, and each one
/// internally fans out one concurrent delivery per non-empty agent slot.
/// Split out from `run` so it can be driven directly in tests without
/// waiting on a live ticker.
pub async fn probe_and_message(state: &ControllerState) {
    let agents = state.agent_manager.list_all_agents();
    tokio::join!(state.rule_buffer.flush(&agents), state.proxy_buffer.flush(&agents));
}

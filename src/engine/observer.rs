// src/engine/observer.rs

//! State-change observation hook.

use tracing::info;

use crate::dag::StateChange;

/// Receives every stored-state transition, in the order the loop applied
/// them. Called on the loop task, so implementations must not block.
pub trait StateObserver: Send + Sync {
    fn on_state_change(&self, change: &StateChange);
}

/// Observer that logs transitions through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl StateObserver for TracingObserver {
    fn on_state_change(&self, change: &StateChange) {
        match change.from {
            Some(from) => info!(
                task = %change.task,
                from = %from,
                to = %change.to,
                at = %change.at,
                "task state changed"
            ),
            None => info!(task = %change.task, to = %change.to, at = %change.at, "task added"),
        }
    }
}

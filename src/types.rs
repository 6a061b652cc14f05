use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Canonical task identifier used throughout the crate.
pub type TaskId = String;

/// Public, read-only view of a task's lifecycle state.
///
/// `Ready` is never stored: it is derived at query time for tasks that are
/// `Idle`/`AwaitingRetry`, due, and dependency-satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Idle,
    Ready,
    Running,
    AwaitingRetry,
    Succeeded,
    Failed,
    Stopped,
}

impl TaskState {
    /// No automatic transition leaves a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Stopped
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Idle => "idle",
            TaskState::Ready => "ready",
            TaskState::Running => "running",
            TaskState::AwaitingRetry => "awaiting_retry",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// How a prerequisite stuck in terminal `Failed` affects its dependents.
///
/// - `Block` (default): dependents never become ready; the blockage is
///   visible through the status query.
/// - `Satisfy`: a `Failed` prerequisite counts as satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DependencyFailurePolicy {
    #[default]
    Block,
    Satisfy,
}

impl FromStr for DependencyFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "block" => Ok(DependencyFailurePolicy::Block),
            "satisfy" => Ok(DependencyFailurePolicy::Satisfy),
            other => Err(format!(
                "invalid dependency_failure_policy: {other} (expected \"block\" or \"satisfy\")"
            )),
        }
    }
}

impl fmt::Display for DependencyFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyFailurePolicy::Block => f.write_str("block"),
            DependencyFailurePolicy::Satisfy => f.write_str("satisfy"),
        }
    }
}

//! Instance lifecycle state machine.
//!
//! The transition function is total: an event that is not valid for the
//! current state leaves it unchanged. Asynchronous process monitoring
//! delivers duplicate and out-of-order notifications; ignoring them here is
//! what keeps the rest of the supervisor simple.

use serde::{Deserialize, Serialize};

/// The supervisor's belief about an instance's run state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    /// No run in progress.
    #[default]
    Stopped,
    /// Process spawned, server has not announced readiness yet.
    Starting,
    /// Server announced readiness.
    Running,
    /// The last run ended abnormally or a fault marker was seen.
    Crashed,
}

/// Events that drive lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The supervisor spawned a process for this instance.
    Launched,
    /// The server's ready marker was observed.
    Ready,
    /// A fault marker was observed on the error channel.
    Fault,
    /// The process exited cleanly (or a requested stop completed).
    ExitedClean,
    /// The process exited with a crash/non-zero/signal status.
    ExitedAbnormal,
}

impl LifecycleStatus {
    /// Apply an event, returning the next status.
    ///
    /// `Starting` is mandatory between `Stopped`/`Crashed` and `Running`:
    /// it models the window between process spawn and the readiness
    /// announcement, during which the command channel is not yet guaranteed
    /// to be meaningful to the child. The machine is cyclic; there is no
    /// terminal state.
    #[must_use]
    pub fn apply(self, event: LifecycleEvent) -> Self {
        let next = match (self, event) {
            (Self::Stopped | Self::Crashed, LifecycleEvent::Launched) => Self::Starting,
            (Self::Starting, LifecycleEvent::Ready) => Self::Running,
            (
                Self::Starting | Self::Running,
                LifecycleEvent::Fault | LifecycleEvent::ExitedAbnormal,
            ) => Self::Crashed,
            (Self::Starting | Self::Running, LifecycleEvent::ExitedClean) => Self::Stopped,
            _ => self,
        };
        if next != self {
            tracing::debug!(from = ?self, to = ?next, event = ?event, "Lifecycle transition");
        }
        next
    }

    /// Whether a run is in progress (`Starting` or `Running`).
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Crashed => "crashed",
        };
        f.write_str(s)
    }
}

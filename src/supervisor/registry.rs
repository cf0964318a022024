//! Supervisor registry: one status/run entry per instance id.
//!
//! Status is process-wide state keyed by instance id, queried uniformly
//! whether or not any consumer is currently watching the instance. The
//! registry also enforces the single-active-run rule: starting over a live
//! run force-kills the old one first.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use encoding_rs::Encoding;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Mutex};

use crate::catalog::Instance;
use crate::console::{RuleSet, SpawnError};
use crate::supervisor::runner::{snapshot_of, SharedState};
use crate::supervisor::{
    LifecycleStatus, RunHandle, Snapshot, SupervisorEvent, DEFAULT_CHANNEL_BUFFER,
};

/// How a stop request concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process exited voluntarily within the deadline.
    Graceful,
    /// The deadline elapsed and the process was terminated.
    Forced,
    /// There was no active run to stop.
    NotRunning,
}

/// Error type for `start`.
#[derive(thiserror::Error, Debug)]
pub enum StartError {
    /// No resolvable launch artifact in the instance directory.
    #[error("No launch artifact found for instance '{id}' in {dir}")]
    LaunchNotFound {
        /// Instance that could not be started.
        id: String,
        /// Directory that was searched.
        dir: PathBuf,
    },
    /// The process failed to spawn.
    #[error("Failed to spawn server process: {0}")]
    Spawn(#[from] SpawnError),
}

/// Error type for `send_command`.
#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    /// No active run exists for the target instance.
    #[error("Instance '{id}' has no active run")]
    NotRunning {
        /// Instance the command was addressed to.
        id: String,
    },
    /// The input-channel write failed.
    #[error("Failed to write to server input channel: {0}")]
    WriteFailed(#[from] std::io::Error),
}

/// Public description of a started run.
#[derive(Debug, Clone)]
pub struct RunInfo {
    /// Instance the run belongs to.
    pub instance_id: String,
    /// OS process id.
    pub pid: Option<u32>,
    /// When the run started.
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Supervises server instances: spawning, graceful stop, command injection,
/// and snapshot queries of status and roster.
pub struct Supervisor {
    rules: Arc<RuleSet>,
    encoding: &'static Encoding,
    stop_command: String,
    states: StdMutex<HashMap<String, SharedState>>,
    runs: Mutex<HashMap<String, RunHandle>>,
    events: broadcast::Sender<SupervisorEvent>,
}

impl Supervisor {
    /// Create a supervisor with the given classification rules, UTF-8
    /// console decoding, and the reserved `"stop"` shutdown literal.
    #[must_use]
    pub fn new(rules: RuleSet) -> Self {
        let (events, _) = broadcast::channel(DEFAULT_CHANNEL_BUFFER);
        Self {
            rules: Arc::new(rules),
            encoding: encoding_rs::UTF_8,
            stop_command: "stop".to_string(),
            states: StdMutex::new(HashMap::new()),
            runs: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Set the console text encoding.
    #[must_use]
    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set the shutdown command literal written by `stop`.
    #[must_use]
    pub fn with_stop_command(mut self, command: impl Into<String>) -> Self {
        self.stop_command = command.into();
        self
    }

    /// Subscribe to the observable event stream
    /// (`LineProduced`/`StatusChanged`/`RosterChanged`).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    /// Current lifecycle status for an instance. Instances that never ran
    /// report `Stopped`.
    #[must_use]
    pub fn status(&self, id: &str) -> LifecycleStatus {
        self.snapshot(id).status
    }

    /// Current sorted roster for an instance.
    #[must_use]
    pub fn roster(&self, id: &str) -> Vec<String> {
        self.snapshot(id).roster
    }

    /// Consistent point-in-time snapshot of one instance's derived state.
    #[must_use]
    pub fn snapshot(&self, id: &str) -> Snapshot {
        snapshot_of(&self.state_for(id))
    }

    /// Whether the instance currently has an active run.
    pub async fn is_active(&self, id: &str) -> bool {
        self.runs
            .lock()
            .await
            .get(id)
            .is_some_and(|run| run.try_exit().is_none())
    }

    /// Start an instance.
    ///
    /// If a run is already active for the same instance, it is forcefully
    /// terminated first (kill, not graceful stop); clients of the old run
    /// are dropped without warning. This trades a clean shutdown for start
    /// latency.
    ///
    /// # Errors
    ///
    /// Returns `StartError::LaunchNotFound` if the instance directory holds
    /// no resolvable launch artifact, or `StartError::Spawn` if the process
    /// fails to spawn. On error the instance remains `Stopped`.
    pub async fn start(&self, instance: &Instance) -> Result<RunInfo, StartError> {
        let command = instance
            .resolve_launch()
            .ok_or_else(|| StartError::LaunchNotFound {
                id: instance.id().to_string(),
                dir: instance.dir().to_path_buf(),
            })?;

        let mut runs = self.runs.lock().await;
        if let Some(existing) = runs.get(instance.id()) {
            if existing.try_exit().is_none() {
                tracing::warn!(
                    instance = instance.id(),
                    "Run already active, force-killing it before restart"
                );
                existing.kill();
                existing.exited().await;
            }
        }

        let state = self.state_for(instance.id());
        let handle = RunHandle::launch(
            instance,
            &command,
            state,
            Arc::clone(&self.rules),
            self.encoding,
            self.events.clone(),
        )?;
        let info = RunInfo {
            instance_id: handle.instance_id().to_string(),
            pid: handle.pid(),
            started_at: handle.started_at(),
        };
        runs.insert(instance.id().to_string(), handle);
        Ok(info)
    }

    /// Gracefully stop an instance's active run.
    ///
    /// Writes the shutdown command to the child's input channel (a closed
    /// channel is a no-op, not an error) and waits up to `timeout` for
    /// voluntary exit, then forcefully terminates. Returns how the run
    /// ended; `NotRunning` when there was nothing to stop.
    pub async fn stop(&self, id: &str, timeout: Duration) -> StopOutcome {
        let handle = {
            let runs = self.runs.lock().await;
            match runs.get(id) {
                Some(run) if run.try_exit().is_none() => run.clone(),
                _ => return StopOutcome::NotRunning,
            }
        };

        handle.mark_stop_requested();

        {
            // Holds the input-channel lock across the write, excluding any
            // concurrent send_command.
            let mut stdin = handle.stdin().lock().await;
            if let Some(pipe) = stdin.as_mut() {
                let payload = format!("{}\n", self.stop_command);
                match pipe.write_all(payload.as_bytes()).await {
                    Ok(()) => {
                        let _ = pipe.flush().await;
                    }
                    Err(e) => {
                        tracing::debug!(instance = id, error = %e, "Shutdown command write failed, channel already closed");
                    }
                }
            }
        }

        match tokio::time::timeout(timeout, handle.exited()).await {
            Ok(_) => StopOutcome::Graceful,
            Err(_) => {
                tracing::warn!(instance = id, "Graceful stop deadline elapsed, terminating");
                handle.kill();
                handle.exited().await;
                StopOutcome::Forced
            }
        }
    }

    /// Write one command line to the instance's input channel.
    ///
    /// A trailing newline is appended. No acknowledgment is expected; the
    /// effect is only visible through whatever the child does with it.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::NotRunning` if no active run exists for the
    /// instance (no write is attempted), or `CommandError::WriteFailed` if
    /// the input channel write fails.
    pub async fn send_command(&self, id: &str, text: &str) -> Result<(), CommandError> {
        let handle = {
            let runs = self.runs.lock().await;
            match runs.get(id) {
                Some(run) if run.try_exit().is_none() => run.clone(),
                _ => {
                    return Err(CommandError::NotRunning { id: id.to_string() });
                }
            }
        };

        let mut stdin = handle.stdin().lock().await;
        let Some(pipe) = stdin.as_mut() else {
            return Err(CommandError::NotRunning { id: id.to_string() });
        };
        let payload = format!("{text}\n");
        pipe.write_all(payload.as_bytes()).await?;
        pipe.flush().await?;
        Ok(())
    }

    /// Gracefully stop every active run. Called on application shutdown.
    pub async fn shutdown(&self, timeout: Duration) {
        let ids: Vec<String> = self.runs.lock().await.keys().cloned().collect();
        for id in ids {
            let outcome = self.stop(&id, timeout).await;
            tracing::info!(instance = %id, outcome = ?outcome, "Shutdown stop completed");
        }
    }

    fn state_for(&self, id: &str) -> SharedState {
        let mut states = self
            .states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(states.entry(id.to_string()).or_default())
    }
}

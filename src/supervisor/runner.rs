//! Per-instance run wiring: one child process, one single-writer actor.
//!
//! Output chunks arrive concurrently from two channels, but every mutation
//! of an instance's status and roster happens on one actor task fed by one
//! ordered queue. The stdout reader, stderr reader, and exit waiter are
//! producers; consumers only ever take consistent snapshots.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use encoding_rs::Encoding;
use futures_util::StreamExt;
use serde::Serialize;
use tokio::process::ChildStdin;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::catalog::{Instance, LaunchCommand};
use crate::console::{self, Channel, RuleSet, ServerEvent, ServerProcess, SpawnError};
use crate::supervisor::{LifecycleEvent, LifecycleStatus, Roster};

/// Default buffer size for the per-instance event queue.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// SIGTERM-to-SIGKILL escalation window for forced termination.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// How a finished run exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitInfo {
    /// OS exit code, if the process exited with one.
    pub code: Option<i32>,
    /// Whether the exit was classified abnormal (crash, signal, non-zero
    /// status) rather than a clean or operator-requested stop.
    pub abnormal: bool,
}

/// Observable events surfaced to consumers (UI, CLI). Nothing here is
/// persisted.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// A console line was produced on one of the output channels.
    LineProduced {
        /// Instance the line belongs to.
        instance: String,
        /// Channel the line arrived on.
        channel: Channel,
        /// The decoded line, terminator stripped.
        text: String,
    },
    /// The instance's lifecycle status changed.
    StatusChanged {
        /// Instance whose status changed.
        instance: String,
        /// Status before the transition.
        old: LifecycleStatus,
        /// Status after the transition.
        new: LifecycleStatus,
    },
    /// The connected-client roster changed.
    RosterChanged {
        /// Instance whose roster changed.
        instance: String,
        /// Client that joined, if this was a join.
        joined: Option<String>,
        /// Client that left, if this was a leave.
        left: Option<String>,
    },
}

/// Derived state for one instance. Written only by that instance's actor.
#[derive(Debug, Default)]
pub struct InstanceState {
    pub(crate) status: LifecycleStatus,
    pub(crate) roster: Roster,
    pub(crate) last_exit: Option<ExitInfo>,
}

/// Shared, snapshot-readable instance state.
///
/// Outlives any individual run so status persists across consumer
/// detachment and between runs.
pub(crate) type SharedState = Arc<RwLock<InstanceState>>;

/// Consistent point-in-time view of one instance.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Current lifecycle status.
    pub status: LifecycleStatus,
    /// Sorted connected-client roster.
    pub roster: Vec<String>,
    /// Exit classification of the most recent finished run.
    pub last_exit: Option<ExitInfo>,
}

pub(crate) fn snapshot_of(state: &SharedState) -> Snapshot {
    let guard = state.read().unwrap_or_else(PoisonError::into_inner);
    Snapshot {
        status: guard.status,
        roster: guard.roster.snapshot(),
        last_exit: guard.last_exit,
    }
}

/// Internal source events serialized into the actor's queue.
#[derive(Debug)]
enum RunEvent {
    Line { channel: Channel, text: String },
    Exited { code: Option<i32>, success: bool },
}

enum WaitOutcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    KillRequested,
}

/// One live or just-terminated execution of an instance.
///
/// Cheap to clone; all fields are shared handles onto the same run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    instance_id: String,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    kill: CancellationToken,
    exit_rx: watch::Receiver<Option<ExitInfo>>,
    stop_requested: Arc<AtomicBool>,
}

impl RunHandle {
    /// Spawn the process and wire it into the framing/extraction pipeline.
    ///
    /// Side effect: drives the `Launched` transition (status becomes
    /// `Starting`, roster reset) before returning, so callers observe
    /// `Starting` as soon as `start` succeeds.
    pub(crate) fn launch(
        instance: &Instance,
        command: &LaunchCommand,
        state: SharedState,
        rules: Arc<RuleSet>,
        encoding: &'static Encoding,
        events: broadcast::Sender<SupervisorEvent>,
    ) -> Result<Self, SpawnError> {
        let mut process = ServerProcess::spawn(command, instance.dir())?;
        let instance_id = instance.id().to_string();
        let pid = process.id();
        tracing::info!(instance = %instance_id, pid = ?pid, "Server process spawned");

        let stdin = Arc::new(Mutex::new(process.take_stdin()));
        let stdout = process.take_stdout();
        let stderr = process.take_stderr();

        let (tx, rx) = mpsc::channel::<RunEvent>(DEFAULT_CHANNEL_BUFFER);
        let (exit_tx, exit_rx) = watch::channel(None);
        let kill = CancellationToken::new();
        let stop_requested = Arc::new(AtomicBool::new(false));

        apply_launched(&state, &instance_id, &events);

        if let Some(out) = stdout {
            spawn_reader(out, Channel::Stdout, encoding, tx.clone());
        }
        if let Some(err) = stderr {
            spawn_reader(err, Channel::Stderr, encoding, tx.clone());
        }
        spawn_waiter(process, kill.clone(), tx);
        spawn_actor(ActorContext {
            instance_id: instance_id.clone(),
            state,
            rules,
            events,
            rx,
            exit_tx,
            stdin: Arc::clone(&stdin),
            stop_requested: Arc::clone(&stop_requested),
        });

        Ok(Self {
            instance_id,
            pid,
            started_at: Utc::now(),
            stdin,
            kill,
            exit_rx,
            stop_requested,
        })
    }

    /// Instance this run belongs to.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// OS process id, if the process was still running at spawn.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// When the run was started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Exit classification, if the run has finished.
    #[must_use]
    pub fn try_exit(&self) -> Option<ExitInfo> {
        *self.exit_rx.borrow()
    }

    /// Wait for the run to finish.
    pub async fn exited(&self) -> ExitInfo {
        let mut rx = self.exit_rx.clone();
        loop {
            if let Some(info) = *rx.borrow_and_update() {
                return info;
            }
            if rx.changed().await.is_err() {
                // Actor gone without publishing: nothing left to wait for.
                return ExitInfo {
                    code: None,
                    abnormal: true,
                };
            }
        }
    }

    /// Request forced termination of the run.
    pub fn kill(&self) {
        self.kill.cancel();
    }

    /// Mark that a graceful stop was requested, so the coming exit is
    /// recorded as `Stopped` rather than `Crashed`.
    pub(crate) fn mark_stop_requested(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Shared input-channel handle. `send_command` and `stop` lock it, so
    /// their writes mutually exclude.
    pub(crate) fn stdin(&self) -> &Arc<Mutex<Option<ChildStdin>>> {
        &self.stdin
    }
}

fn spawn_reader<R>(
    reader: R,
    channel: Channel,
    encoding: &'static Encoding,
    tx: mpsc::Sender<RunEvent>,
) where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = std::pin::pin!(console::lines(reader, encoding));
        while let Some(text) = lines.next().await {
            if tx.send(RunEvent::Line { channel, text }).await.is_err() {
                break;
            }
        }
    });
}

fn spawn_waiter(mut process: ServerProcess, kill: CancellationToken, tx: mpsc::Sender<RunEvent>) {
    tokio::spawn(async move {
        let outcome = tokio::select! {
            status = process.wait() => WaitOutcome::Exited(status),
            () = kill.cancelled() => WaitOutcome::KillRequested,
        };

        let status = match outcome {
            WaitOutcome::Exited(status) => status,
            WaitOutcome::KillRequested => {
                let _ = process.terminate(KILL_GRACE).await;
                process.wait().await
            }
        };

        let event = match status {
            Ok(status) => RunEvent::Exited {
                code: status.code(),
                success: status.success(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Failed waiting for server process");
                RunEvent::Exited {
                    code: None,
                    success: false,
                }
            }
        };
        let _ = tx.send(event).await;
    });
}

struct ActorContext {
    instance_id: String,
    state: SharedState,
    rules: Arc<RuleSet>,
    events: broadcast::Sender<SupervisorEvent>,
    rx: mpsc::Receiver<RunEvent>,
    exit_tx: watch::Sender<Option<ExitInfo>>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    stop_requested: Arc<AtomicBool>,
}

fn spawn_actor(mut ctx: ActorContext) {
    tokio::spawn(async move {
        let mut exited = false;
        while let Some(event) = ctx.rx.recv().await {
            match event {
                RunEvent::Line { channel, text } => {
                    // Every line is forwarded verbatim, classified or not.
                    let _ = ctx.events.send(SupervisorEvent::LineProduced {
                        instance: ctx.instance_id.clone(),
                        channel,
                        text: text.clone(),
                    });
                    if let Some(server_event) = ctx.rules.classify(channel, &text) {
                        apply_server_event(&ctx, server_event);
                    }
                }
                RunEvent::Exited { code, success } => {
                    // Some process APIs notify twice; record once per run.
                    if exited {
                        continue;
                    }
                    exited = true;
                    apply_exit(&ctx, code, success).await;
                }
            }
        }
        tracing::debug!(instance = %ctx.instance_id, "Run event queue closed");
    });
}

fn apply_launched(state: &SharedState, instance_id: &str, events: &broadcast::Sender<SupervisorEvent>) {
    let mut guard = state.write().unwrap_or_else(PoisonError::into_inner);
    let old = guard.status;
    guard.status = old.apply(LifecycleEvent::Launched);
    guard.roster.reset();
    guard.last_exit = None;
    let new = guard.status;
    drop(guard);
    if new != old {
        let _ = events.send(SupervisorEvent::StatusChanged {
            instance: instance_id.to_string(),
            old,
            new,
        });
    }
}

fn apply_server_event(ctx: &ActorContext, event: ServerEvent) {
    let mut guard = ctx.state.write().unwrap_or_else(PoisonError::into_inner);
    match event {
        ServerEvent::Ready => {
            let old = guard.status;
            guard.status = old.apply(LifecycleEvent::Ready);
            let new = guard.status;
            drop(guard);
            emit_status(ctx, old, new);
        }
        ServerEvent::Fault => {
            let old = guard.status;
            guard.status = old.apply(LifecycleEvent::Fault);
            let new = guard.status;
            if new != old {
                guard.roster.reset();
            }
            drop(guard);
            emit_status(ctx, old, new);
        }
        ServerEvent::ClientJoined { name } => {
            let changed = guard.status.is_live() && guard.roster.apply_joined(name.clone());
            drop(guard);
            if changed {
                let _ = ctx.events.send(SupervisorEvent::RosterChanged {
                    instance: ctx.instance_id.clone(),
                    joined: Some(name),
                    left: None,
                });
            }
        }
        ServerEvent::ClientLeft { name } => {
            let changed = guard.status.is_live() && guard.roster.apply_left(&name);
            drop(guard);
            if changed {
                let _ = ctx.events.send(SupervisorEvent::RosterChanged {
                    instance: ctx.instance_id.clone(),
                    joined: None,
                    left: Some(name),
                });
            }
        }
    }
}

async fn apply_exit(ctx: &ActorContext, code: Option<i32>, success: bool) {
    // A stop the operator asked for is a stop, even when the deadline
    // forced a kill and the exit status reads as signaled.
    let stop_requested = ctx.stop_requested.load(Ordering::SeqCst);
    let abnormal = !success && !stop_requested;
    let info = ExitInfo { code, abnormal };

    tracing::info!(
        instance = %ctx.instance_id,
        code = ?code,
        abnormal,
        "Server process exited"
    );

    // The pipe is gone; drop our end so later writes see a closed channel.
    ctx.stdin.lock().await.take();

    let lifecycle_event = if abnormal {
        LifecycleEvent::ExitedAbnormal
    } else {
        LifecycleEvent::ExitedClean
    };

    let (old, new) = {
        let mut guard = ctx.state.write().unwrap_or_else(PoisonError::into_inner);
        let old = guard.status;
        guard.status = old.apply(lifecycle_event);
        guard.last_exit = Some(info);
        if guard.status != old {
            guard.roster.reset();
        }
        (old, guard.status)
    };
    emit_status(ctx, old, new);

    let _ = ctx.exit_tx.send(Some(info));
}

fn emit_status(ctx: &ActorContext, old: LifecycleStatus, new: LifecycleStatus) {
    if new != old {
        let _ = ctx.events.send(SupervisorEvent::StatusChanged {
            instance: ctx.instance_id.clone(),
            old,
            new,
        });
    }
}

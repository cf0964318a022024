//! End-to-end supervisor tests against real child processes.
//!
//! Each test spawns a small shell script standing in for a game server and
//! asserts the derived status, roster, and exit classification.

#![cfg(unix)]

use std::time::Duration;

use server_warden::catalog::Instance;
use server_warden::console::RuleSet;
use server_warden::supervisor::{LifecycleStatus, StopOutcome, Supervisor, SupervisorEvent};
use tempfile::TempDir;

/// A script that emits startup chatter, then serves its stdin until told to
/// stop.
const INTERACTIVE_SERVER: &str = r#"
echo '[Server] Starting test server'
echo 'Alice joined the game'
echo 'Done (1.0s)! For help, type "help"'
echo 'Player connected: Bob'
while read line; do
  if [ "$line" = "stop" ]; then
    exit 0
  fi
  echo "got: $line"
done
"#;

fn script_instance(temp: &TempDir, id: &str, script: &str) -> Instance {
    let dir = temp.path().join(id);
    std::fs::create_dir(&dir).unwrap();
    std::fs::write(dir.join("start.sh"), script).unwrap();
    Instance::new(id, dir)
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within deadline"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn run_reaches_running_and_tracks_roster() {
    let temp = TempDir::new().unwrap();
    let instance = script_instance(&temp, "survival", INTERACTIVE_SERVER);
    let supervisor = Supervisor::new(RuleSet::minecraft());

    let info = supervisor.start(&instance).await.unwrap();
    assert_eq!(info.instance_id, "survival");
    assert!(info.pid.is_some());

    wait_until(|| supervisor.status("survival") == LifecycleStatus::Running).await;
    wait_until(|| supervisor.roster("survival") == ["Alice", "Bob"]).await;
    assert!(supervisor.is_active("survival").await);

    let outcome = supervisor.stop("survival", Duration::from_secs(5)).await;
    assert_eq!(outcome, StopOutcome::Graceful);

    let snapshot = supervisor.snapshot("survival");
    assert_eq!(snapshot.status, LifecycleStatus::Stopped);
    assert!(snapshot.roster.is_empty());
    let exit = snapshot.last_exit.unwrap();
    assert_eq!(exit.code, Some(0));
    assert!(!exit.abnormal);
}

#[tokio::test]
async fn abnormal_exit_marks_crashed_and_clears_roster() {
    let script = r#"
echo 'Done (0.1s)! For help, type "help"'
echo 'Steve joined the game'
exit 3
"#;
    let temp = TempDir::new().unwrap();
    let instance = script_instance(&temp, "flaky", script);
    let supervisor = Supervisor::new(RuleSet::minecraft());

    supervisor.start(&instance).await.unwrap();
    wait_until(|| supervisor.status("flaky") == LifecycleStatus::Crashed).await;

    let snapshot = supervisor.snapshot("flaky");
    assert!(snapshot.roster.is_empty());
    let exit = snapshot.last_exit.unwrap();
    assert_eq!(exit.code, Some(3));
    assert!(exit.abnormal);
}

#[tokio::test]
async fn requested_stop_is_not_a_crash_even_with_nonzero_exit() {
    let script = r#"
echo 'Done (0.1s)! For help, type "help"'
while read line; do
  if [ "$line" = "stop" ]; then
    exit 1
  fi
done
"#;
    let temp = TempDir::new().unwrap();
    let instance = script_instance(&temp, "grumpy", script);
    let supervisor = Supervisor::new(RuleSet::minecraft());

    supervisor.start(&instance).await.unwrap();
    wait_until(|| supervisor.status("grumpy") == LifecycleStatus::Running).await;

    let outcome = supervisor.stop("grumpy", Duration::from_secs(5)).await;
    assert_eq!(outcome, StopOutcome::Graceful);

    let snapshot = supervisor.snapshot("grumpy");
    assert_eq!(snapshot.status, LifecycleStatus::Stopped);
    let exit = snapshot.last_exit.unwrap();
    assert_eq!(exit.code, Some(1));
    assert!(!exit.abnormal);
}

#[tokio::test]
async fn stop_deadline_escalates_to_forced_termination() {
    // Ignores its stdin entirely, so the stop command has no effect
    let script = r#"
echo 'Done (0.1s)! For help, type "help"'
sleep 30
"#;
    let temp = TempDir::new().unwrap();
    let instance = script_instance(&temp, "stubborn", script);
    let supervisor = Supervisor::new(RuleSet::minecraft());

    supervisor.start(&instance).await.unwrap();
    wait_until(|| supervisor.status("stubborn") == LifecycleStatus::Running).await;

    let outcome = supervisor
        .stop("stubborn", Duration::from_millis(200))
        .await;
    assert_eq!(outcome, StopOutcome::Forced);

    // Forced or not, an operator-requested stop lands on Stopped
    assert_eq!(supervisor.status("stubborn"), LifecycleStatus::Stopped);
    assert!(!supervisor.is_active("stubborn").await);
}

#[tokio::test]
async fn stderr_fault_marks_crashed_while_process_is_alive() {
    let script = r#"
echo 'Done (0.1s)! For help, type "help"'
echo 'Exception in server tick loop' 1>&2
sleep 30
"#;
    let temp = TempDir::new().unwrap();
    let instance = script_instance(&temp, "broken", script);
    let supervisor = Supervisor::new(RuleSet::minecraft());

    supervisor.start(&instance).await.unwrap();
    wait_until(|| supervisor.status("broken") == LifecycleStatus::Crashed).await;
    assert!(supervisor.is_active("broken").await);

    // Cleanup; the state machine stays in Crashed through the exit
    supervisor.stop("broken", Duration::from_millis(100)).await;
    assert_eq!(supervisor.status("broken"), LifecycleStatus::Crashed);
}

#[tokio::test]
async fn send_command_reaches_the_child() {
    let temp = TempDir::new().unwrap();
    let instance = script_instance(&temp, "echoer", INTERACTIVE_SERVER);
    let supervisor = Supervisor::new(RuleSet::minecraft());
    let mut events = supervisor.subscribe();

    supervisor.start(&instance).await.unwrap();
    wait_until(|| supervisor.status("echoer") == LifecycleStatus::Running).await;

    supervisor.send_command("echoer", "say hello").await.unwrap();

    let saw_echo = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(SupervisorEvent::LineProduced { text, .. }) if text == "got: say hello" => {
                    break;
                }
                Ok(_) => {}
                Err(_) => panic!("event stream closed before echo arrived"),
            }
        }
    })
    .await;
    assert!(saw_echo.is_ok(), "child never echoed the sent command");

    supervisor.stop("echoer", Duration::from_secs(5)).await;
}

#[tokio::test]
async fn starting_over_an_active_run_replaces_it() {
    let temp = TempDir::new().unwrap();
    let instance = script_instance(&temp, "world", INTERACTIVE_SERVER);
    let supervisor = Supervisor::new(RuleSet::minecraft());

    let first = supervisor.start(&instance).await.unwrap();
    wait_until(|| supervisor.status("world") == LifecycleStatus::Running).await;

    let second = supervisor.start(&instance).await.unwrap();
    assert_ne!(first.pid, second.pid);
    assert!(supervisor.is_active("world").await);

    supervisor.stop("world", Duration::from_secs(5)).await;
}

#[tokio::test]
async fn shutdown_stops_every_active_run() {
    let temp = TempDir::new().unwrap();
    let alpha = script_instance(&temp, "alpha", INTERACTIVE_SERVER);
    let beta = script_instance(&temp, "beta", INTERACTIVE_SERVER);
    let supervisor = Supervisor::new(RuleSet::minecraft());

    supervisor.start(&alpha).await.unwrap();
    supervisor.start(&beta).await.unwrap();
    wait_until(|| supervisor.status("alpha") == LifecycleStatus::Running).await;
    wait_until(|| supervisor.status("beta") == LifecycleStatus::Running).await;

    supervisor.shutdown(Duration::from_secs(5)).await;

    assert_eq!(supervisor.status("alpha"), LifecycleStatus::Stopped);
    assert_eq!(supervisor.status("beta"), LifecycleStatus::Stopped);
    assert!(!supervisor.is_active("alpha").await);
    assert!(!supervisor.is_active("beta").await);
}

#[tokio::test]
async fn status_survives_consumer_detachment() {
    let temp = TempDir::new().unwrap();
    let instance = script_instance(&temp, "persist", INTERACTIVE_SERVER);
    let supervisor = Supervisor::new(RuleSet::minecraft());

    // Subscribe, start, then drop the subscription mid-run
    let events = supervisor.subscribe();
    supervisor.start(&instance).await.unwrap();
    wait_until(|| supervisor.status("persist") == LifecycleStatus::Running).await;
    wait_until(|| supervisor.roster("persist") == ["Alice", "Bob"]).await;
    drop(events);

    // Queries keep answering with no subscriber attached
    assert_eq!(supervisor.status("persist"), LifecycleStatus::Running);
    assert_eq!(supervisor.roster("persist"), ["Alice", "Bob"]);

    supervisor.stop("persist", Duration::from_secs(5)).await;
    assert_eq!(supervisor.status("persist"), LifecycleStatus::Stopped);
}

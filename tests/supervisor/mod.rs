//! Supervisor module tests.

mod runner_test;

/// Verify all public supervisor types are exported from the library.
#[test]
fn test_all_supervisor_types_exported() {
    use server_warden::console::RuleSet;
    use server_warden::supervisor::{
        CommandError, ExitInfo, LifecycleEvent, LifecycleStatus, Roster, StartError, StopOutcome,
        Supervisor, SupervisorEvent, DEFAULT_CHANNEL_BUFFER,
    };

    // Verify types are constructible
    let _ = Roster::new();
    let _ = LifecycleStatus::default();
    let _ = Supervisor::new(RuleSet::minecraft());
    let _ = StopOutcome::NotRunning;
    let _ = LifecycleEvent::Launched;
    let _ = ExitInfo {
        code: Some(0),
        abnormal: false,
    };
    let _ = SupervisorEvent::StatusChanged {
        instance: "a".to_string(),
        old: LifecycleStatus::Stopped,
        new: LifecycleStatus::Starting,
    };

    // Verify error types exist
    let _: fn(String) -> CommandError = |id| CommandError::NotRunning { id };
    let _: fn(String, std::path::PathBuf) -> StartError =
        |id, dir| StartError::LaunchNotFound { id, dir };

    assert!(DEFAULT_CHANNEL_BUFFER > 0);
}

//! Tests for console line classification.

use server_warden::console::{Channel, EventRule, RuleSet, ServerEvent};

fn rules() -> RuleSet {
    RuleSet::minecraft()
}

#[test]
fn vanilla_join_captures_name() {
    let event = rules().classify(
        Channel::Stdout,
        "[12:00:01] [Server thread/INFO]: Steve joined the game",
    );
    assert_eq!(
        event,
        Some(ServerEvent::ClientJoined {
            name: "Steve".to_string()
        })
    );
}

#[test]
fn vanilla_leave_captures_name() {
    let event = rules().classify(
        Channel::Stdout,
        "[12:05:44] [Server thread/INFO]: Steve left the game",
    );
    assert_eq!(
        event,
        Some(ServerEvent::ClientLeft {
            name: "Steve".to_string()
        })
    );
}

#[test]
fn plugin_server_phrasings_classify() {
    let rules = rules();
    assert_eq!(
        rules.classify(Channel::Stdout, "Player connected: Alex, xuid: 253"),
        Some(ServerEvent::ClientJoined {
            name: "Alex".to_string()
        })
    );
    assert_eq!(
        rules.classify(Channel::Stdout, "Player disconnected: Alex, xuid: 253"),
        Some(ServerEvent::ClientLeft {
            name: "Alex".to_string()
        })
    );
}

#[test]
fn ready_markers_classify() {
    let rules = rules();
    assert_eq!(
        rules.classify(
            Channel::Stdout,
            r#"[12:00:09] [Server thread/INFO]: Done (9.206s)! For help, type "help""#
        ),
        Some(ServerEvent::Ready)
    );
    assert_eq!(
        rules.classify(Channel::Stdout, r#"For help, type "help""#),
        Some(ServerEvent::Ready)
    );
}

#[test]
fn fault_marker_only_applies_to_stderr() {
    let rules = rules();
    let line = "Exception in server tick loop";
    assert_eq!(rules.classify(Channel::Stderr, line), Some(ServerEvent::Fault));
    // The same text on stdout is routine log chatter
    assert_eq!(rules.classify(Channel::Stdout, line), None);
}

#[test]
fn unmatched_lines_produce_no_event() {
    let rules = rules();
    assert_eq!(
        rules.classify(Channel::Stdout, "[12:00:02] [Server thread/INFO]: Starting minecraft server version 1.21"),
        None
    );
    assert_eq!(rules.classify(Channel::Stderr, "warning: low memory"), None);
}

#[test]
fn first_matching_rule_wins() {
    let mut rules = RuleSet::new();
    rules.add_rule(EventRule::ready(r"marker").unwrap());
    rules.add_rule(EventRule::join(r"(\w+) marker").unwrap());

    // Both rules match; only the earlier one fires
    assert_eq!(
        rules.classify(Channel::Stdout, "Steve marker"),
        Some(ServerEvent::Ready)
    );
}

#[test]
fn invalid_pattern_is_rejected() {
    assert!(EventRule::join(r"(unclosed").is_err());
}

#[test]
fn builtin_rule_table_is_populated() {
    let rules = rules();
    assert!(!rules.is_empty());
    assert!(rules.len() >= 7);
}

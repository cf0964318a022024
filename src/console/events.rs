//! Pattern-based classification of console lines into server events.
//!
//! Each framed line is checked against an ordered rule table; the first
//! matching rule emits one event. Lines that match nothing produce no event.
//! Classification is stateless and total: it never fails, and every line is
//! still forwarded verbatim for display regardless of the outcome.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Output channel a line arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Structured event extracted from a single console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A client connected to the server.
    ClientJoined {
        /// Client identifier captured from the line.
        name: String,
    },
    /// A client disconnected from the server.
    ClientLeft {
        /// Client identifier captured from the line.
        name: String,
    },
    /// The server announced it finished starting up.
    Ready,
    /// A fatal-looking marker was seen on the error channel.
    Fault,
}

/// What a rule emits when its pattern matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
    Join,
    Leave,
    Ready,
    Fault,
}

/// Error type for rule construction.
#[derive(thiserror::Error, Debug)]
pub enum RuleError {
    /// Invalid regex pattern.
    #[error("Invalid rule pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// One classification rule: a pattern, what it emits, and which channel it
/// applies to (`None` means both).
#[derive(Debug, Clone)]
pub struct EventRule {
    kind: RuleKind,
    pattern: Regex,
    channel: Option<Channel>,
}

impl EventRule {
    fn new(kind: RuleKind, pattern: &str, channel: Option<Channel>) -> Result<Self, RuleError> {
        Ok(Self {
            kind,
            pattern: Regex::new(pattern)?,
            channel,
        })
    }

    /// Create a join rule. The pattern's first capture group is the client
    /// name and must only admit word characters, so chat lines echoing the
    /// join phrase do not produce false captures.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidPattern` if the regex is invalid.
    pub fn join(pattern: &str) -> Result<Self, RuleError> {
        Self::new(RuleKind::Join, pattern, None)
    }

    /// Create a leave rule. Same capture contract as [`EventRule::join`].
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidPattern` if the regex is invalid.
    pub fn leave(pattern: &str) -> Result<Self, RuleError> {
        Self::new(RuleKind::Leave, pattern, None)
    }

    /// Create a ready-marker rule.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidPattern` if the regex is invalid.
    pub fn ready(pattern: &str) -> Result<Self, RuleError> {
        Self::new(RuleKind::Ready, pattern, None)
    }

    /// Create a fault-marker rule, restricted to the error channel.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidPattern` if the regex is invalid.
    pub fn fault(pattern: &str) -> Result<Self, RuleError> {
        Self::new(RuleKind::Fault, pattern, Some(Channel::Stderr))
    }

    /// Get the pattern string (for debugging/display).
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    fn apply(&self, channel: Channel, line: &str) -> Option<ServerEvent> {
        if self.channel.is_some_and(|c| c != channel) {
            return None;
        }
        let captures = self.pattern.captures(line)?;
        match self.kind {
            RuleKind::Join => Some(ServerEvent::ClientJoined {
                name: captures.get(1)?.as_str().to_string(),
            }),
            RuleKind::Leave => Some(ServerEvent::ClientLeft {
                name: captures.get(1)?.as_str().to_string(),
            }),
            RuleKind::Ready => Some(ServerEvent::Ready),
            RuleKind::Fault => Some(ServerEvent::Fault),
        }
    }
}

/// Ordered rule table for one server family.
///
/// New server families extend the table with their own phrasings; the state
/// machine and roster never change.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<EventRule>,
}

impl RuleSet {
    /// Create an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Rule set for Minecraft-style servers (vanilla and plugin-server
    /// phrasings).
    #[must_use]
    pub fn minecraft() -> Self {
        let rules = Self::minecraft_rules()
            .into_iter()
            .filter_map(|result| match result {
                Ok(rule) => Some(rule),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to compile built-in event rule");
                    None
                }
            })
            .collect();
        Self { rules }
    }

    /// Append a rule to the table. Later rules only apply to lines no
    /// earlier rule matched.
    pub fn add_rule(&mut self, rule: EventRule) {
        self.rules.push(rule);
    }

    /// Classify a line, returning at most one event.
    ///
    /// Rules are evaluated in order; the first match wins.
    #[must_use]
    pub fn classify(&self, channel: Channel, line: &str) -> Option<ServerEvent> {
        self.rules.iter().find_map(|rule| rule.apply(channel, line))
    }

    /// Check if the rule set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Get the number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    fn minecraft_rules() -> Vec<Result<EventRule, RuleError>> {
        vec![
            // Vanilla phrasing
            EventRule::join(r"\b(\w+) joined the game\b"),
            EventRule::leave(r"\b(\w+) left the game\b"),
            // Plugin-server phrasing
            EventRule::join(r"Player connected: (\w+)\b"),
            EventRule::leave(r"Player disconnected: (\w+)\b"),
            // Startup-complete markers
            EventRule::ready(r"Done \("),
            EventRule::ready(r#"For help, type "help""#),
            // Crash markers, error channel only
            EventRule::fault(r"Exception|Error|FAILED|Caused by"),
        ]
    }
}

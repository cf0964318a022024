//! Connected-client roster for one instance.
//!
//! The source log stream is neither reliable nor complete, so every
//! mutation is tolerant: re-adding a present name and removing an absent
//! name are both no-ops.

use std::collections::BTreeSet;

/// Set of currently-connected client identifiers.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    members: BTreeSet<String>,
}

impl Roster {
    /// Create an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a client join. Returns `true` if the roster changed.
    pub fn apply_joined(&mut self, name: impl Into<String>) -> bool {
        self.members.insert(name.into())
    }

    /// Record a client leave. Returns `true` if the roster changed.
    pub fn apply_left(&mut self, name: &str) -> bool {
        self.members.remove(name)
    }

    /// Clear the roster. Called on every transition into `Starting` and on
    /// transition to `Stopped`/`Crashed`.
    pub fn reset(&mut self) {
        self.members.clear();
    }

    /// Current membership as a sorted sequence, for deterministic display.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.members.iter().cloned().collect()
    }

    /// Number of connected clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether no clients are connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether the given client is connected.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.members.contains(name)
    }
}

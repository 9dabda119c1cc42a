/// Session state definitions for tracking scrape progress
///
/// A session moves through these states one page at a time; only the
/// transitions listed in `can_transition_to` are legal.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current state of a scrape session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    // ===== Active States =====
    /// Created, not yet started
    Idle,

    /// Fetching the current page over HTTP (including retries)
    Fetching,

    /// Loading the current page in the browser driver
    Rendering,

    /// Applying extraction rules to the current document
    Extracting,

    /// Looking for the next page
    Paginating,

    // ===== Terminal States =====
    /// No further pages; every fetched page was extracted
    Completed,

    /// Stopped by a permanent error
    Failed,

    /// Stopped on request
    Cancelled,
}

impl SessionState {
    /// Returns true if this is a terminal state (the session is over)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if the session may still make progress
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Checks whether moving from this state to `next` is allowed
    ///
    /// Every active state may fail or be cancelled. Terminal states have no
    /// outgoing transitions.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        if self.is_terminal() {
            return false;
        }
        if matches!(next, Failed | Cancelled) {
            return true;
        }

        matches!(
            (self, next),
            (Idle, Fetching)
                | (Fetching, Rendering)
                | (Fetching, Extracting)
                | (Rendering, Extracting)
                | (Extracting, Paginating)
                | (Paginating, Fetching)
                | (Paginating, Completed)
        )
    }

    /// Converts the state to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Rendering => "rendering",
            Self::Extracting => "extracting",
            Self::Paginating => "paginating",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns all possible session states
    #[cfg(test)]
    pub(crate) fn all_states() -> Vec<Self> {
        vec![
            Self::Idle,
            Self::Fetching,
            Self::Rendering,
            Self::Extracting,
            Self::Paginating,
            Self::Completed,
            Self::Failed,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

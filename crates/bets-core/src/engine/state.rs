//! Session lifecycle states.

use std::fmt;

/// Where a [`super::ClientSession`] is in its lifecycle.
///
/// ```text
/// Idle -> Connected -> Streaming -> Finalizing -> Querying -> Closed
///                  \______________________________^
/// any non-terminal state -> Failed
/// ```
///
/// `Connected -> Querying` is the query-only session. `Streaming ->
/// Closed` is a cancelled run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Connected,
    Streaming,
    Finalizing,
    Querying,
    Closed,
    Failed,
}

impl SessionState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    /// Whether moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        if next == Failed {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Idle, Connected)
                | (Connected, Streaming)
                | (Connected, Querying)
                | (Connected, Closed)
                | (Streaming, Finalizing)
                | (Streaming, Closed)
                | (Finalizing, Querying)
                | (Finalizing, Closed)
                | (Querying, Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connected => "connected",
            SessionState::Streaming => "streaming",
            SessionState::Finalizing => "finalizing",
            SessionState::Querying => "querying",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

//! Dictation session lifecycle states.

use std::fmt;

/// The lifecycle state of a dictation session.
///
/// Owned exclusively by the session; created `Idle` at startup and reset to
/// `Idle` on stop or unrecoverable failure. Transitions are monotonic within
/// one start/stop cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session in progress, ready to start
    Idle,
    /// Start requested, acquiring audio and recognition resources
    Starting,
    /// Audio pipeline confirmed running, transcripts flowing
    Listening,
    /// Stop requested, tearing down taps and recognition
    Stopping,
    /// A fatal error occurred; transient, always followed by `Idle`
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Starting => write!(f, "starting"),
            SessionState::Listening => write!(f, "listening"),
            SessionState::Stopping => write!(f, "stopping"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

impl SessionState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::Idle, SessionState::Starting)
                | (SessionState::Starting, SessionState::Listening)
                | (SessionState::Starting, SessionState::Idle)
                | (SessionState::Starting, SessionState::Failed)
                | (SessionState::Listening, SessionState::Stopping)
                | (SessionState::Listening, SessionState::Failed)
                | (SessionState::Stopping, SessionState::Idle)
                | (SessionState::Failed, SessionState::Idle)
        )
    }

    /// Whether a session is in progress in any form.
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }
}

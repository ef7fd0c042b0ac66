//! Session lifecycle events and transcript updates.
//!
//! These types cross the boundary between the session core and whatever UI
//! hosts it, without depending on any specific UI framework.

use std::time::Instant;

/// One transcript fragment produced by a transcription backend.
#[derive(Debug, Clone)]
pub struct TranscriptUpdate {
    /// Decoded text, possibly a partial hypothesis
    pub text: String,
    /// Whether this update supersedes all earlier partials and is safe to act on
    pub is_final: bool,
    /// When the backend produced this update
    pub timestamp: Instant,
}

impl TranscriptUpdate {
    /// A partial (display-only) update.
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            timestamp: Instant::now(),
        }
    }

    /// A final update, eligible for command interpretation and insertion.
    pub fn finished(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            timestamp: Instant::now(),
        }
    }
}

/// Events emitted by a dictation session for external consumers (tray icon,
/// floating status window, log).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The audio pipeline is confirmed running and transcripts will flow
    Started,
    /// The session was torn down, whether by request or after a failure
    Stopped,
    /// A failure occurred; the session has already been reset to idle
    Failed(String),
    /// A partial transcript for live display; never inserted
    TranscriptPreview(String),
}

//! Transcription backends for murmur.
//!
//! This crate provides a trait-based abstraction for turning captured audio
//! into transcript updates, with a policy wrapper for host speech
//! recognizers, a one-shot remote HTTP backend, and an optional local
//! Whisper engine.

mod native;
mod remote;

#[cfg(feature = "local-whisper")]
mod local;
#[cfg(feature = "local-whisper")]
mod model;

use async_trait::async_trait;
#[cfg(feature = "local-whisper")]
pub use local::{LocalWhisperConfig, WhisperBackend};
#[cfg(feature = "local-whisper")]
pub use model::{WhisperModel, download_model, ensure_model, model_exists, model_path};
use murmur_audio::AudioBuffer;
use murmur_core::TranscriptUpdate;
pub use native::{NativeBackend, RecognitionRequest, RecognitionTask, SpeechProvider};
pub use remote::{DEFAULT_REMOTE_ENDPOINT, RemoteBackend};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

/// Errors that can occur while starting or running a backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("on-device recognition is not available for locale {0:?}")]
    UnsupportedLocale(String),

    #[error("no API credential configured")]
    MissingCredential,

    #[error("remote transcription failed: {0}")]
    Remote(String),

    #[error("recognition engine error: {0}")]
    Engine(String),

    #[error("recognition was cancelled")]
    Cancelled,
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// One item on a backend's update channel: a transcript update, or a fatal
/// error that ends the session.
pub type BackendUpdate = std::result::Result<TranscriptUpdate, BackendError>;

/// A strategy for converting captured audio into transcript updates.
///
/// The session owns the audio tap and calls `feed` with every captured
/// buffer; streaming backends push updates on the channel handed to `start`,
/// while buffering backends produce their single final update from `finish`.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Begin recognition. Streamed updates (and fatal errors) are delivered
    /// on `updates`; buffering backends may never send anything.
    fn start(&self, updates: UnboundedSender<BackendUpdate>) -> Result<()>;

    /// Consume one captured audio buffer. Called from the capture thread.
    fn feed(&self, buffer: &AudioBuffer);

    /// Signal the end of audio and flush. Streaming backends return
    /// `Ok(None)` once drained; buffering backends perform their submission
    /// here and return the single final update. Called at most once per
    /// session; a cancelled backend returns `Ok(None)`.
    async fn finish(&self) -> Result<Option<TranscriptUpdate>>;

    /// Abort recognition, discarding buffered audio. Safe to call multiple
    /// times, and concurrently with `feed`.
    fn cancel(&self);

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}

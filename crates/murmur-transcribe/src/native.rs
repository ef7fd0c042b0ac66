//! Policy wrapper for host speech recognizers.
//!
//! The actual OS speech binding is an external collaborator implementing
//! [`SpeechProvider`]. This module owns the policy around it: the on-device
//! requirement is checked up front and surfaced as `UnsupportedLocale`
//! instead of silently degrading; whether to fall back to cloud recognition
//! is the caller's decision, never the backend's.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use murmur_audio::AudioBuffer;
use murmur_core::TranscriptUpdate;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::{BackendError, BackendUpdate, Result, TranscriptionBackend};

/// Parameters for one recognition run on the host engine.
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    /// Recognition locale (BCP 47). None = system locale.
    pub locale: Option<String>,
    /// Refuse to send audio off-device.
    pub require_on_device: bool,
    /// Deliver partial hypotheses, not just finals.
    pub partial_results: bool,
}

/// Handle to one in-flight recognition task on the host engine.
pub trait RecognitionTask: Send {
    /// Feed captured audio into the recognizer.
    fn feed(&self, buffer: &AudioBuffer);

    /// Mark the end of audio; the engine finishes decoding what it has.
    fn end_audio(&self);

    /// Abort recognition immediately. Idempotent.
    fn cancel(&self);
}

/// Capability interface over the host speech recognizer.
pub trait SpeechProvider: Send + Sync {
    /// Whether on-device recognition is available for the locale.
    fn supports_on_device(&self, locale: Option<&str>) -> bool;

    /// Start a recognition task streaming updates onto `updates`.
    fn begin(
        &self,
        request: RecognitionRequest,
        updates: UnboundedSender<BackendUpdate>,
    ) -> Result<Box<dyn RecognitionTask>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

/// Streaming backend wrapping a [`SpeechProvider`].
pub struct NativeBackend {
    provider: Arc<dyn SpeechProvider>,
    request: RecognitionRequest,
    task: Mutex<Option<Box<dyn RecognitionTask>>>,
    cancelled: AtomicBool,
}

impl NativeBackend {
    pub fn new(
        provider: Arc<dyn SpeechProvider>,
        locale: Option<String>,
        require_on_device: bool,
    ) -> Self {
        Self {
            provider,
            request: RecognitionRequest {
                locale,
                require_on_device,
                partial_results: true,
            },
            task: Mutex::new(None),
            cancelled: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl TranscriptionBackend for NativeBackend {
    fn start(&self, updates: UnboundedSender<BackendUpdate>) -> Result<()> {
        if self.request.require_on_device
            && !self.provider.supports_on_device(self.request.locale.as_deref())
        {
            return Err(BackendError::UnsupportedLocale(
                self.request.locale.clone().unwrap_or_else(|| "system".to_string()),
            ));
        }

        debug!(
            provider = self.provider.name(),
            locale = ?self.request.locale,
            on_device = self.request.require_on_device,
            "Starting host recognition"
        );

        let task = self.provider.begin(self.request.clone(), updates)?;
        *self.task.lock() = Some(task);
        Ok(())
    }

    fn feed(&self, buffer: &AudioBuffer) {
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.task.lock().as_ref() {
            task.feed(buffer);
        }
    }

    async fn finish(&self) -> Result<Option<TranscriptUpdate>> {
        // Streamed finals were already delivered on the channel; just let
        // the engine know the audio has ended.
        if let Some(task) = self.task.lock().take() {
            task.end_audio();
        }
        Ok(None)
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.task.lock().take() {
            task.cancel();
        }
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use tokio::sync::mpsc::unbounded_channel;

    use super::*;

    struct FakeTask {
        cancels: Arc<AtomicUsize>,
        ended: Arc<AtomicBool>,
    }

    impl RecognitionTask for FakeTask {
        fn feed(&self, _buffer: &AudioBuffer) {}

        fn end_audio(&self) {
            self.ended.store(true, Ordering::SeqCst);
        }

        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeProvider {
        on_device_locales: Vec<String>,
        cancels: Arc<AtomicUsize>,
        ended: Arc<AtomicBool>,
    }

    impl SpeechProvider for FakeProvider {
        fn supports_on_device(&self, locale: Option<&str>) -> bool {
            locale.is_some_and(|l| self.on_device_locales.iter().any(|s| s == l))
        }

        fn begin(
            &self,
            _request: RecognitionRequest,
            updates: UnboundedSender<BackendUpdate>,
        ) -> Result<Box<dyn RecognitionTask>> {
            updates.send(Ok(TranscriptUpdate::partial("he"))).ok();
            updates.send(Ok(TranscriptUpdate::finished("hello"))).ok();
            Ok(Box::new(FakeTask {
                cancels: Arc::clone(&self.cancels),
                ended: Arc::clone(&self.ended),
            }))
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    fn provider() -> (Arc<FakeProvider>, Arc<AtomicUsize>, Arc<AtomicBool>) {
        let cancels = Arc::new(AtomicUsize::new(0));
        let ended = Arc::new(AtomicBool::new(false));
        let provider = Arc::new(FakeProvider {
            on_device_locales: vec!["en-US".to_string()],
            cancels: Arc::clone(&cancels),
            ended: Arc::clone(&ended),
        });
        (provider, cancels, ended)
    }

    #[tokio::test]
    async fn test_unsupported_locale_is_surfaced() {
        let (provider, _, _) = provider();
        let backend = NativeBackend::new(provider, Some("xx-XX".to_string()), true);
        let (tx, _rx) = unbounded_channel();
        match backend.start(tx) {
            Err(BackendError::UnsupportedLocale(locale)) => assert_eq!(locale, "xx-XX"),
            other => panic!("expected UnsupportedLocale, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_on_device_supported_locale_starts() {
        let (provider, _, _) = provider();
        let backend = NativeBackend::new(provider, Some("en-US".to_string()), true);
        let (tx, mut rx) = unbounded_channel();
        backend.start(tx).unwrap();

        let first = rx.recv().await.unwrap().unwrap();
        assert!(!first.is_final);
        let second = rx.recv().await.unwrap().unwrap();
        assert!(second.is_final);
        assert_eq!(second.text, "hello");
    }

    #[tokio::test]
    async fn test_locale_not_checked_without_on_device_requirement() {
        let (provider, _, _) = provider();
        let backend = NativeBackend::new(provider, Some("xx-XX".to_string()), false);
        let (tx, _rx) = unbounded_channel();
        assert!(backend.start(tx).is_ok());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (provider, cancels, _) = provider();
        let backend = NativeBackend::new(provider, Some("en-US".to_string()), true);
        let (tx, _rx) = unbounded_channel();
        backend.start(tx).unwrap();

        backend.cancel();
        backend.cancel();
        backend.cancel();
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_finish_ends_audio() {
        let (provider, _, ended) = provider();
        let backend = NativeBackend::new(provider, Some("en-US".to_string()), true);
        let (tx, _rx) = unbounded_channel();
        backend.start(tx).unwrap();

        assert!(backend.finish().await.unwrap().is_none());
        assert!(ended.load(Ordering::SeqCst));
    }
}

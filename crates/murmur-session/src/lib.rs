//! Dictation session lifecycle for murmur.
//!
//! One [`DictationSession`] per process orchestrates the whole pipeline:
//! it owns the audio source, selects and starts a transcription backend
//! from a configuration snapshot, routes every final transcript through the
//! voice-command interpreter into the text actuator, and reports lifecycle
//! events upward. Start and stop are serialized; every failure path tears
//! the pipeline down to idle before it is reported.

mod actuator;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub use actuator::TextActuator;
use murmur_audio::{AudioError, AudioSource, TapId};
use murmur_core::{BackendChoice, CommandResult, Config, SessionEvent, SessionState, interpret};
use murmur_transcribe::{BackendError, BackendUpdate, TranscriptionBackend};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, error, info, warn};

/// Errors returned by session start/stop.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A session is already running; the running session is untouched
    #[error("a dictation session is already active")]
    AlreadyActive,
    /// The remote backend is selected but no API key is configured
    #[error("remote backend selected but no API key is configured")]
    MissingCredential,
    /// The capture device could not be acquired
    #[error("audio unavailable: {0}")]
    AudioUnavailable(#[from] AudioError),
    /// The transcription backend refused to start
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Parameters for building a streaming recognizer backend.
#[derive(Debug, Clone)]
pub struct RecognizerRequest {
    /// Recognition locale from the config snapshot
    pub locale: Option<String>,
    /// Whether recognition must stay on-device
    pub require_on_device: bool,
}

/// Builds the recognizer backend for the on-device/automatic backend kinds.
/// The session decides the fallback policy; the factory just constructs.
pub type RecognizerFactory = Box<
    dyn Fn(&RecognizerRequest) -> murmur_transcribe::Result<Arc<dyn TranscriptionBackend>>
        + Send
        + Sync,
>;

struct ActiveSession {
    backend: Arc<dyn TranscriptionBackend>,
    tap: TapId,
    voice_commands: bool,
}

struct Inner {
    /// Serializes start/stop/failure handling: one state transition in
    /// flight at a time. Always acquired before `dispatch_gate`.
    control: Mutex<()>,
    state: Mutex<SessionState>,
    audio: Arc<dyn AudioSource>,
    actuator: Arc<dyn TextActuator>,
    events: UnboundedSender<SessionEvent>,
    /// Bumped on every start/stop/failure; the transcript pump drops
    /// updates stamped with an older generation.
    generation: AtomicU64,
    /// Held around every actuator dispatch. `stop()` acquires it once after
    /// bumping the generation, which both waits out an in-flight dispatch
    /// and guarantees later updates observe the bump.
    dispatch_gate: Mutex<()>,
    active: Mutex<Option<ActiveSession>>,
}

impl Inner {
    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock();
        debug_assert!(
            state.can_transition_to(next),
            "invalid session transition {} -> {}",
            *state,
            next
        );
        debug!(from = %*state, to = %next, "session state");
        *state = next;
    }

    /// Interpret one final transcript and apply it.
    fn dispatch(&self, text: &str, voice_commands: bool) {
        let result = if voice_commands {
            interpret(text)
        } else if text.trim().is_empty() {
            CommandResult::Ignore
        } else {
            CommandResult::Text(text.trim().to_string())
        };

        match result {
            CommandResult::Text(text) => self.actuator.insert(&text),
            CommandResult::Action(action) => {
                info!(action = ?action, "performing voice command");
                self.actuator.perform(action);
            }
            CommandResult::Ignore => {}
        }
    }

    /// Remove the tap, cancel recognition, and release the device.
    fn teardown_active(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        drop(self.dispatch_gate.lock());

        if let Some(active) = self.active.lock().take() {
            self.audio.remove_tap(active.tap);
            active.backend.cancel();
        }
        self.audio.close();
    }

    /// Fatal error reported by the backend while listening. Performs the
    /// same teardown as stop and emits a single Failed event.
    fn fail(&self, reason: &str) {
        let _control = self.control.lock();
        if !self.state.lock().is_active() {
            return;
        }

        error!(reason, "dictation session failed");
        self.set_state(SessionState::Failed);
        self.teardown_active();
        self.set_state(SessionState::Idle);
        self.events.send(SessionEvent::Failed(reason.to_string())).ok();
    }
}

/// The per-process dictation session orchestrator.
pub struct DictationSession {
    inner: Arc<Inner>,
    recognizers: RecognizerFactory,
    runtime: Runtime,
}

impl DictationSession {
    /// Build a session around its collaborators. Events are delivered on
    /// `events`; the caller keeps the receiving end.
    pub fn new(
        audio: Arc<dyn AudioSource>,
        actuator: Arc<dyn TextActuator>,
        recognizers: RecognizerFactory,
        events: UnboundedSender<SessionEvent>,
    ) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                control: Mutex::new(()),
                state: Mutex::new(SessionState::Idle),
                audio,
                actuator,
                events,
                generation: AtomicU64::new(0),
                dispatch_gate: Mutex::new(()),
                active: Mutex::new(None),
            }),
            recognizers,
            runtime,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Start a session from a configuration snapshot.
    ///
    /// Later config edits do not affect this session; a backend kind is
    /// resolved once, here.
    pub fn start(&self, config: &Config) -> Result<()> {
        let _control = self.inner.control.lock();

        if self.inner.state.lock().is_active() {
            return Err(SessionError::AlreadyActive);
        }
        self.inner.set_state(SessionState::Starting);

        // Credential check comes first: no audio capture is attempted for a
        // remote session that cannot possibly submit.
        if config.backend == BackendChoice::RemoteApi && config.remote_api_key().is_none() {
            self.inner.set_state(SessionState::Idle);
            return Err(SessionError::MissingCredential);
        }

        if let Err(e) = self.inner.audio.open(config.input_device()) {
            self.inner.set_state(SessionState::Idle);
            return Err(SessionError::AudioUnavailable(e));
        }

        let (updates_tx, updates_rx) = unbounded_channel();
        let backend = match self.spin_up_backend(config, updates_tx) {
            Ok(backend) => backend,
            Err(e) => {
                self.inner.audio.close();
                self.inner.set_state(SessionState::Idle);
                return Err(e);
            }
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.spawn_pump(updates_rx, generation, config.live_preview, config.voice_commands);

        let tap_backend = Arc::clone(&backend);
        let tap = self
            .inner
            .audio
            .add_tap(Box::new(move |buffer| tap_backend.feed(buffer)));

        info!(backend = backend.name(), locale = ?config.locale(), "dictation session started");
        *self.inner.active.lock() = Some(ActiveSession {
            backend,
            tap,
            voice_commands: config.voice_commands,
        });
        self.inner.set_state(SessionState::Listening);
        self.inner.events.send(SessionEvent::Started).ok();
        Ok(())
    }

    /// Stop the session. Idempotent: stopping an idle session is a no-op
    /// and emits nothing.
    ///
    /// Teardown never blocks on the backend: `finish()` (which performs the
    /// remote submission) runs on the session runtime and reports its
    /// outcome through a later event.
    pub fn stop(&self) -> Result<()> {
        let _control = self.inner.control.lock();

        match *self.inner.state.lock() {
            SessionState::Idle | SessionState::Stopping => return Ok(()),
            _ => {}
        }
        self.inner.set_state(SessionState::Stopping);

        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        // Wait out any dispatch already past its generation check; nothing
        // reaches the actuator from the streamed path after this point.
        drop(self.inner.dispatch_gate.lock());

        if let Some(active) = self.inner.active.lock().take() {
            self.inner.audio.remove_tap(active.tap);
            self.inner.audio.close();

            let inner = Arc::clone(&self.inner);
            let voice_commands = active.voice_commands;
            self.runtime.spawn(async move {
                match active.backend.finish().await {
                    Ok(Some(update)) => {
                        debug!(
                            backend = active.backend.name(),
                            "final transcript delivered after stop"
                        );
                        inner.dispatch(&update.text, voice_commands);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(error = %e, "backend finish failed");
                        inner.events.send(SessionEvent::Failed(e.to_string())).ok();
                    }
                }
            });
        }

        self.inner.set_state(SessionState::Idle);
        self.inner.events.send(SessionEvent::Stopped).ok();
        Ok(())
    }

    /// Resolve the backend kind and start the backend, applying the
    /// on-device fallback policy.
    fn spin_up_backend(
        &self,
        config: &Config,
        updates: UnboundedSender<BackendUpdate>,
    ) -> Result<Arc<dyn TranscriptionBackend>> {
        let request = RecognizerRequest {
            locale: config.locale.clone(),
            require_on_device: true,
        };

        match config.backend {
            BackendChoice::RemoteApi => {
                // Credential presence was checked before audio acquisition.
                let key = config.remote_api_key().ok_or(SessionError::MissingCredential)?;
                let backend: Arc<dyn TranscriptionBackend> = Arc::new(
                    murmur_transcribe::RemoteBackend::new(key, config.remote_endpoint()),
                );
                backend.start(updates)?;
                Ok(backend)
            }
            BackendChoice::OnDeviceOnly => {
                let backend = (self.recognizers)(&request)?;
                backend.start(updates)?;
                Ok(backend)
            }
            BackendChoice::Automatic => {
                let backend = (self.recognizers)(&request)?;
                match backend.start(updates.clone()) {
                    Ok(()) => Ok(backend),
                    Err(BackendError::UnsupportedLocale(locale)) => {
                        warn!(
                            locale,
                            "on-device recognition unavailable, falling back to cloud"
                        );
                        let fallback = (self.recognizers)(&RecognizerRequest {
                            require_on_device: false,
                            ..request
                        })?;
                        fallback.start(updates)?;
                        Ok(fallback)
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Drain the backend's update channel for one session generation.
    fn spawn_pump(
        &self,
        mut updates: UnboundedReceiver<BackendUpdate>,
        generation: u64,
        live_preview: bool,
        voice_commands: bool,
    ) {
        let inner = Arc::clone(&self.inner);
        self.runtime.spawn(async move {
            while let Some(update) = updates.recv().await {
                match update {
                    Ok(update) if !update.is_final => {
                        // Partials are display-only; superseded text must
                        // never be inserted.
                        if live_preview
                            && inner.generation.load(Ordering::SeqCst) == generation
                        {
                            inner
                                .events
                                .send(SessionEvent::TranscriptPreview(update.text))
                                .ok();
                        }
                    }
                    Ok(update) => {
                        let gate = inner.dispatch_gate.lock();
                        if inner.generation.load(Ordering::SeqCst) != generation {
                            break;
                        }
                        inner.dispatch(&update.text, voice_commands);
                        drop(gate);
                    }
                    Err(e) => {
                        if inner.generation.load(Ordering::SeqCst) == generation {
                            inner.fail(&e.to_string());
                        }
                        break;
                    }
                }
            }
            debug!(generation, "transcript pump ended");
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use murmur_audio::{AudioBuffer, TapHandler, TapSet};
    use murmur_core::{Action, TranscriptUpdate};
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;

    // ---- fakes ----------------------------------------------------------

    #[derive(Default)]
    struct FakeAudio {
        taps: TapSet,
        fail_open: AtomicBool,
        opens: AtomicUsize,
        open: AtomicBool,
    }

    impl AudioSource for FakeAudio {
        fn open(&self, _device: Option<&str>) -> murmur_audio::Result<()> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail_open.load(Ordering::SeqCst) {
                return Err(AudioError::DeviceUnavailable("busy".to_string()));
            }
            self.open.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn add_tap(&self, handler: TapHandler) -> TapId {
            self.taps.add(handler)
        }

        fn remove_tap(&self, id: TapId) {
            self.taps.remove(id);
        }

        fn close(&self) {
            self.open.store(false, Ordering::SeqCst);
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct FakeActuator {
        inserts: Mutex<Vec<String>>,
        actions: Mutex<Vec<Action>>,
    }

    impl TextActuator for FakeActuator {
        fn insert(&self, text: &str) {
            self.inserts.lock().push(text.to_string());
        }

        fn perform(&self, action: Action) {
            self.actions.lock().push(action);
        }
    }

    impl FakeActuator {
        fn total_calls(&self) -> usize {
            self.inserts.lock().len() + self.actions.lock().len()
        }
    }

    /// Streaming backend fake: exposes the captured update sender so tests
    /// can inject transcripts, and a configurable finish result.
    struct FakeBackend {
        updates: Mutex<Option<UnboundedSender<BackendUpdate>>>,
        start_error: Mutex<Option<BackendError>>,
        finish_result: Mutex<Option<murmur_transcribe::Result<Option<TranscriptUpdate>>>>,
        cancels: AtomicUsize,
    }

    impl FakeBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                updates: Mutex::new(None),
                start_error: Mutex::new(None),
                finish_result: Mutex::new(None),
                cancels: AtomicUsize::new(0),
            })
        }

        fn send(&self, update: BackendUpdate) {
            self.updates
                .lock()
                .as_ref()
                .expect("backend not started")
                .send(update)
                .ok();
        }
    }

    #[async_trait]
    impl TranscriptionBackend for FakeBackend {
        fn start(
            &self,
            updates: UnboundedSender<BackendUpdate>,
        ) -> murmur_transcribe::Result<()> {
            if let Some(e) = self.start_error.lock().take() {
                return Err(e);
            }
            *self.updates.lock() = Some(updates);
            Ok(())
        }

        fn feed(&self, _buffer: &AudioBuffer) {}

        async fn finish(&self) -> murmur_transcribe::Result<Option<TranscriptUpdate>> {
            self.finish_result.lock().take().unwrap_or(Ok(None))
        }

        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    struct Harness {
        session: DictationSession,
        audio: Arc<FakeAudio>,
        actuator: Arc<FakeActuator>,
        backend: Arc<FakeBackend>,
        events: UnboundedReceiver<SessionEvent>,
        factory_calls: Arc<Mutex<Vec<RecognizerRequest>>>,
    }

    fn harness() -> Harness {
        let audio = Arc::new(FakeAudio::default());
        let actuator = Arc::new(FakeActuator::default());
        let backend = FakeBackend::new();
        let factory_calls = Arc::new(Mutex::new(Vec::new()));

        let factory_backend = Arc::clone(&backend);
        let calls = Arc::clone(&factory_calls);
        let recognizers: RecognizerFactory = Box::new(move |request| {
            calls.lock().push(request.clone());
            Ok(Arc::clone(&factory_backend) as Arc<dyn TranscriptionBackend>)
        });

        let (events_tx, events) = unbounded_channel();
        let session = DictationSession::new(
            Arc::clone(&audio) as Arc<dyn AudioSource>,
            Arc::clone(&actuator) as Arc<dyn TextActuator>,
            recognizers,
            events_tx,
        )
        .unwrap();

        Harness {
            session,
            audio,
            actuator,
            backend,
            events,
            factory_calls,
        }
    }

    fn recv_event(events: &mut UnboundedReceiver<SessionEvent>) -> SessionEvent {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match events.try_recv() {
                Ok(event) => return event,
                Err(_) => {
                    assert!(Instant::now() < deadline, "timed out waiting for event");
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        }
    }

    fn wait_until(deadline_ms: u64, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_millis(deadline_ms);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    // ---- lifecycle ------------------------------------------------------

    #[test]
    fn test_start_twice_is_already_active() {
        let mut h = harness();
        h.session.start(&Config::default()).unwrap();
        assert_eq!(recv_event(&mut h.events), SessionEvent::Started);

        match h.session.start(&Config::default()) {
            Err(SessionError::AlreadyActive) => {}
            other => panic!("expected AlreadyActive, got {:?}", other.map(|_| ())),
        }
        assert_eq!(h.session.state(), SessionState::Listening);
    }

    #[test]
    fn test_stop_on_idle_is_a_silent_noop() {
        let mut h = harness();
        h.session.stop().unwrap();
        h.session.stop().unwrap();
        assert_eq!(h.session.state(), SessionState::Idle);
        assert!(h.events.try_recv().is_err(), "no event expected");
    }

    #[test]
    fn test_start_stop_roundtrip() {
        let mut h = harness();
        h.session.start(&Config::default()).unwrap();
        assert_eq!(h.session.state(), SessionState::Listening);
        assert!(h.audio.is_open());

        h.session.stop().unwrap();
        assert_eq!(h.session.state(), SessionState::Idle);
        assert!(!h.audio.is_open());
        assert!(h.audio.taps.is_empty());

        assert_eq!(recv_event(&mut h.events), SessionEvent::Started);
        assert_eq!(recv_event(&mut h.events), SessionEvent::Stopped);
    }

    #[test]
    fn test_missing_credential_checked_before_audio() {
        let mut h = harness();
        let config = Config {
            backend: BackendChoice::RemoteApi,
            ..Default::default()
        };

        match h.session.start(&config) {
            Err(SessionError::MissingCredential) => {}
            other => panic!("expected MissingCredential, got {:?}", other.map(|_| ())),
        }
        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.audio.opens.load(Ordering::SeqCst), 0, "audio must not be touched");
        assert!(h.events.try_recv().is_err());
    }

    #[test]
    fn test_audio_unavailable_returns_to_idle() {
        let h = harness();
        h.audio.fail_open.store(true, Ordering::SeqCst);

        match h.session.start(&Config::default()) {
            Err(SessionError::AudioUnavailable(_)) => {}
            other => panic!("expected AudioUnavailable, got {:?}", other.map(|_| ())),
        }
        assert_eq!(h.session.state(), SessionState::Idle);
    }

    #[test]
    fn test_backend_start_failure_releases_audio() {
        let h = harness();
        *h.backend.start_error.lock() =
            Some(BackendError::Engine("recognizer refused".to_string()));

        assert!(h.session.start(&Config::default()).is_err());
        assert_eq!(h.session.state(), SessionState::Idle);
        assert!(!h.audio.is_open(), "audio must be released on failure");
    }

    // ---- fallback policy ------------------------------------------------

    #[test]
    fn test_on_device_only_fails_on_unsupported_locale() {
        let h = harness();
        *h.backend.start_error.lock() =
            Some(BackendError::UnsupportedLocale("xx-XX".to_string()));

        let config = Config {
            backend: BackendChoice::OnDeviceOnly,
            locale: Some("xx-XX".to_string()),
            ..Default::default()
        };
        match h.session.start(&config) {
            Err(SessionError::Backend(BackendError::UnsupportedLocale(_))) => {}
            other => panic!("expected UnsupportedLocale, got {:?}", other.map(|_| ())),
        }
        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.factory_calls.lock().len(), 1, "no fallback attempt");
    }

    #[test]
    fn test_automatic_falls_back_when_on_device_unsupported() {
        let h = harness();
        // First start attempt (on-device) fails; second succeeds.
        *h.backend.start_error.lock() =
            Some(BackendError::UnsupportedLocale("xx-XX".to_string()));

        let config = Config {
            locale: Some("xx-XX".to_string()),
            ..Default::default()
        };
        h.session.start(&config).unwrap();
        assert_eq!(h.session.state(), SessionState::Listening);

        let calls = h.factory_calls.lock();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].require_on_device);
        assert!(!calls[1].require_on_device);
    }

    // ---- transcript routing ---------------------------------------------

    #[test]
    fn test_only_final_updates_reach_the_actuator() {
        let mut h = harness();
        h.session.start(&Config::default()).unwrap();

        h.backend.send(Ok(TranscriptUpdate::partial("hel")));
        h.backend.send(Ok(TranscriptUpdate::partial("hello wor")));
        h.backend.send(Ok(TranscriptUpdate::finished("hello world")));

        assert!(wait_until(5000, || h.actuator.total_calls() == 1));
        assert_eq!(h.actuator.inserts.lock().as_slice(), ["hello world"]);

        // Partials surfaced as preview events only.
        assert_eq!(recv_event(&mut h.events), SessionEvent::Started);
        assert_eq!(
            recv_event(&mut h.events),
            SessionEvent::TranscriptPreview("hel".to_string())
        );
        assert_eq!(
            recv_event(&mut h.events),
            SessionEvent::TranscriptPreview("hello wor".to_string())
        );
    }

    #[test]
    fn test_final_command_phrase_performs_action() {
        let h = harness();
        h.session.start(&Config::default()).unwrap();

        h.backend.send(Ok(TranscriptUpdate::finished("select all")));

        assert!(wait_until(5000, || h.actuator.total_calls() == 1));
        assert_eq!(h.actuator.actions.lock().as_slice(), [Action::SelectAll]);
        assert!(h.actuator.inserts.lock().is_empty());
    }

    #[test]
    fn test_voice_commands_disabled_inserts_literally() {
        let h = harness();
        let config = Config {
            voice_commands: false,
            ..Default::default()
        };
        h.session.start(&config).unwrap();

        h.backend.send(Ok(TranscriptUpdate::finished("select all")));

        assert!(wait_until(5000, || h.actuator.total_calls() == 1));
        assert_eq!(h.actuator.inserts.lock().as_slice(), ["select all"]);
    }

    #[test]
    fn test_live_preview_disabled_suppresses_preview_events() {
        let mut h = harness();
        let config = Config {
            live_preview: false,
            ..Default::default()
        };
        h.session.start(&config).unwrap();
        assert_eq!(recv_event(&mut h.events), SessionEvent::Started);

        h.backend.send(Ok(TranscriptUpdate::partial("hel")));
        h.backend.send(Ok(TranscriptUpdate::finished("hello")));
        assert!(wait_until(5000, || h.actuator.total_calls() == 1));
        assert!(h.events.try_recv().is_err(), "no preview expected");
    }

    #[test]
    fn test_updates_after_stop_are_dropped() {
        let h = harness();
        h.session.start(&Config::default()).unwrap();
        h.session.stop().unwrap();

        h.backend.send(Ok(TranscriptUpdate::finished("too late")));

        assert!(!wait_until(100, || h.actuator.total_calls() > 0));
        assert_eq!(h.actuator.total_calls(), 0);
    }

    // ---- failure handling -------------------------------------------------

    #[test]
    fn test_backend_error_fails_session_and_tears_down() {
        let mut h = harness();
        h.session.start(&Config::default()).unwrap();
        assert_eq!(recv_event(&mut h.events), SessionEvent::Started);

        h.backend.send(Err(BackendError::Engine("mic died".to_string())));

        match recv_event(&mut h.events) {
            SessionEvent::Failed(reason) => assert!(reason.contains("mic died")),
            other => panic!("expected Failed, got {:?}", other),
        }
        assert!(wait_until(5000, || h.session.state() == SessionState::Idle));
        assert!(!h.audio.is_open());
        assert_eq!(h.backend.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(h.actuator.total_calls(), 0);
    }

    #[test]
    fn test_remote_failure_during_stop_is_reported_without_blocking() {
        let mut h = harness();
        h.session.start(&Config::default()).unwrap();
        *h.backend.finish_result.lock() =
            Some(Err(BackendError::Remote("connection refused".to_string())));

        // stop() returns promptly and the session is idle even though the
        // submission fails.
        h.session.stop().unwrap();
        assert_eq!(h.session.state(), SessionState::Idle);

        let mut failed = 0;
        let mut stopped = 0;
        for _ in 0..3 {
            match recv_event(&mut h.events) {
                SessionEvent::Started => {}
                SessionEvent::Stopped => stopped += 1,
                SessionEvent::Failed(reason) => {
                    assert!(reason.contains("connection refused"));
                    failed += 1;
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(stopped, 1);
        assert_eq!(failed, 1);
        assert_eq!(h.actuator.total_calls(), 0, "failure must never insert text");
    }

    #[test]
    fn test_finish_transcript_after_stop_is_inserted() {
        let h = harness();
        h.session.start(&Config::default()).unwrap();
        *h.backend.finish_result.lock() =
            Some(Ok(Some(TranscriptUpdate::finished("buffered result"))));

        h.session.stop().unwrap();
        assert_eq!(h.session.state(), SessionState::Idle);

        assert!(wait_until(5000, || h.actuator.total_calls() == 1));
        assert_eq!(h.actuator.inserts.lock().as_slice(), ["buffered result"]);
    }

    #[test]
    fn test_restart_after_stop() {
        let h = harness();
        h.session.start(&Config::default()).unwrap();
        h.session.stop().unwrap();
        h.session.start(&Config::default()).unwrap();
        assert_eq!(h.session.state(), SessionState::Listening);
    }
}

//! Local Whisper backend using whisper-rs.
//!
//! A buffering backend like the remote one: captured samples accumulate
//! during the session and the whole recording is decoded once at `finish`.
//! Everything stays on-device.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use murmur_audio::AudioBuffer;
use murmur_core::TranscriptUpdate;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::model::{WhisperModel, model_path};
use crate::{BackendError, BackendUpdate, Result, TranscriptionBackend};

/// Whisper decodes 16 kHz mono.
const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Configuration for the local Whisper backend.
#[derive(Debug, Clone, Default)]
pub struct LocalWhisperConfig {
    /// The model to use.
    pub model: WhisperModel,
    /// Optional override path to the model file.
    pub model_path: Option<PathBuf>,
    /// Recognition locale; only the language subtag is used ("en-US" -> "en").
    pub locale: Option<String>,
}

/// On-device transcription via whisper.cpp.
pub struct WhisperBackend {
    config: LocalWhisperConfig,
    /// Lazily initialized whisper context; loading the model is expensive.
    context: Mutex<Option<WhisperContext>>,
    samples: Mutex<Vec<f32>>,
    format: Mutex<Option<(u32, u16)>>,
    cancelled: AtomicBool,
}

impl WhisperBackend {
    pub fn new(config: LocalWhisperConfig) -> Self {
        Self {
            config,
            context: Mutex::new(None),
            samples: Mutex::new(Vec::new()),
            format: Mutex::new(None),
            cancelled: AtomicBool::new(false),
        }
    }

    fn language(&self) -> Option<String> {
        self.config
            .locale
            .as_deref()
            .map(|locale| locale.split(['-', '_']).next().unwrap_or(locale).to_lowercase())
    }

    fn transcribe(&self, samples: &[f32]) -> Result<String> {
        let mut context = self.context.lock();
        if context.is_none() {
            let path = match &self.config.model_path {
                Some(p) => p.clone(),
                None => model_path(self.config.model)
                    .map_err(|e| BackendError::Engine(e.to_string()))?,
            };

            info!(path = ?path, "Loading Whisper model");
            let ctx = WhisperContext::new_with_params(
                path.to_str()
                    .ok_or_else(|| BackendError::Engine("invalid model path".to_string()))?,
                WhisperContextParameters::default(),
            )
            .map_err(|e| BackendError::Engine(format!("failed to load model: {e}")))?;
            *context = Some(ctx);
        }

        let ctx = context.as_ref().expect("context initialized above");
        let mut state = ctx
            .create_state()
            .map_err(|e| BackendError::Engine(format!("failed to create state: {e}")))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        let language = self.language();
        params.set_language(language.as_deref());
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, samples)
            .map_err(|e| BackendError::Engine(format!("decode failed: {e}")))?;

        let num_segments = state
            .full_n_segments()
            .map_err(|e| BackendError::Engine(format!("failed to get segments: {e}")))?;

        let mut result = String::new();
        for i in 0..num_segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| BackendError::Engine(format!("failed to get segment {i}: {e}")))?;
            result.push_str(&segment);
        }

        Ok(result.trim().to_string())
    }
}

#[async_trait]
impl TranscriptionBackend for WhisperBackend {
    fn start(&self, _updates: UnboundedSender<BackendUpdate>) -> Result<()> {
        Ok(())
    }

    fn feed(&self, buffer: &AudioBuffer) {
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }
        self.format
            .lock()
            .get_or_insert((buffer.sample_rate, buffer.channels));
        self.samples.lock().extend_from_slice(&buffer.samples);
    }

    async fn finish(&self) -> Result<Option<TranscriptUpdate>> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let samples = std::mem::take(&mut *self.samples.lock());
        let Some((sample_rate, channels)) = *self.format.lock() else {
            return Ok(None);
        };
        if samples.is_empty() {
            return Ok(None);
        }

        let mono = downmix(&samples, channels);
        let decoder_input = resample(&mono, sample_rate, WHISPER_SAMPLE_RATE);

        debug!(
            input_samples = samples.len(),
            decoder_samples = decoder_input.len(),
            "Decoding recording with local Whisper"
        );

        let text = self.transcribe(&decoder_input)?;
        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(TranscriptUpdate::finished(text)))
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.samples.lock().clear();
    }

    fn name(&self) -> &'static str {
        "local-whisper"
    }
}

/// Average interleaved channels down to mono.
fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear-interpolation resampling.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = (samples.len() as f64 / ratio) as usize;
    let mut result = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src = i as f64 * ratio;
        let base = src.floor() as usize;
        let frac = src - base as f64;

        let sample = match (samples.get(base), samples.get(base + 1)) {
            (Some(&s0), Some(&s1)) => (s0 as f64 * (1.0 - frac) + s1 as f64 * frac) as f32,
            (Some(&s0), None) => s0,
            _ => 0.0,
        };
        result.push(sample);
    }

    result
}

//! Microphone capture for murmur.
//!
//! One capture stream at a time, fanned out to any number of registered
//! taps (recognition backend, level meter, remote-submission buffer). Each
//! tap receives a shared read-only view of every captured buffer.
//!
//! ## Format notes
//!
//! Buffers carry f32 samples at the device's native rate. The remote
//! backend encodes them to an in-memory WAV at submit time; uncompressed
//! audio runs roughly 370 KiB per second of mono 48 kHz float, which is fine
//! for dictation-length recordings.

mod capture;

use std::io::Cursor;
use std::sync::Arc;

use cpal::Sample;
use hound::WavWriter;
use thiserror::Error;

pub use capture::{CpalAudioSource, TapSet};

/// Errors from the audio capture layer.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Permission not granted, device busy, or a named device does not exist
    #[error("input device unavailable: {0}")]
    DeviceUnavailable(String),
    /// The device's sample format is not supported
    #[error("sample format not supported: {0}")]
    UnsupportedFormat(String),
    /// The capture stream could not be built or started
    #[error("capture stream error: {0}")]
    Stream(String),
    /// Audio data could not be encoded
    #[error("encode error: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// One captured chunk of audio. Immutable after production; taps share the
/// same sample storage.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Interleaved f32 samples
    pub samples: Arc<[f32]>,
    /// Samples per second per channel
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
}

impl AudioBuffer {
    /// Number of frames (samples per channel) in this buffer.
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

/// Identifier for a registered tap.
pub type TapId = u64;

/// Callback invoked on the capture thread with each produced buffer.
pub type TapHandler = Box<dyn Fn(&AudioBuffer) + Send + 'static>;

/// A microphone owner that fans captured buffers out to registered taps.
///
/// Implemented by [`CpalAudioSource`] for real devices and by fakes in
/// session tests.
pub trait AudioSource: Send + Sync {
    /// Open the capture device and start delivering buffers to taps.
    ///
    /// `device` selects an input by name; `None` uses the system default.
    /// A named device that does not exist fails with `DeviceUnavailable`
    /// rather than falling back.
    fn open(&self, device: Option<&str>) -> Result<()>;

    /// Register a tap. Taps added while capturing start receiving the next
    /// produced buffer.
    fn add_tap(&self, handler: TapHandler) -> TapId;

    /// Remove a tap. Unknown ids are ignored.
    fn remove_tap(&self, id: TapId);

    /// Stop capturing and release the device. Idempotent.
    fn close(&self);

    /// Whether a capture stream is currently running.
    fn is_open(&self) -> bool;
}

/// Encode interleaved f32 samples as an in-memory WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 4));
    let mut writer =
        WavWriter::new(&mut cursor, spec).map_err(|e| AudioError::Encode(e.to_string()))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| AudioError::Encode(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| AudioError::Encode(e.to_string()))?;

    Ok(cursor.into_inner())
}

/// Floor for the dBFS meter.
pub const MIN_DB: f32 = -96.0;

/// Convert a slice of f32 samples to dBFS, for level metering.
pub fn db_fs(data: &[f32]) -> f32 {
    let max_sample = data
        .iter()
        .fold(f32::EQUILIBRIUM, |max, &sample| sample.abs().max(max));

    (20.0 * max_sample.log10()).clamp(MIN_DB, 0.0)
}

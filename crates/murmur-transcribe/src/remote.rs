//! Remote HTTP transcription backend.
//!
//! Buffers raw samples for the whole session, then on `finish` encodes one
//! in-memory WAV and makes a single POST to the configured endpoint. There
//! is no incremental streaming and no automatic retry; a failed submission
//! is terminal for the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use murmur_audio::AudioBuffer;
use murmur_core::TranscriptUpdate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::{BackendError, BackendUpdate, Result, TranscriptionBackend};

/// Default endpoint when the config does not override it.
pub const DEFAULT_REMOTE_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

/// Hard ceiling on the submission; a hung request becomes a remote failure
/// instead of blocking forever.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct TranscribeRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    inline_data: InlineData,
}

#[derive(Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: String,
}

/// Build the JSON request body around a base64-encoded WAV payload.
fn build_request(wav: &[u8]) -> TranscribeRequest {
    TranscribeRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![Part {
                inline_data: InlineData {
                    mime_type: "audio/wav",
                    data: BASE64.encode(wav),
                },
            }],
        }],
    }
}

/// Extract the transcript from a response body. Any deviation from the
/// expected shape is a parse failure; partial or garbage text is never
/// returned.
fn parse_transcript(body: &str) -> Result<String> {
    let response: TranscribeResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::Remote(format!("malformed response: {e}")))?;

    response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content.parts.into_iter().next())
        .map(|part| part.text)
        .ok_or_else(|| BackendError::Remote("response contained no transcript".to_string()))
}

/// Buffering backend submitting the whole recording in one request.
pub struct RemoteBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    samples: Mutex<Vec<f32>>,
    // (sample_rate, channels) captured from the first buffer
    format: Mutex<Option<(u32, u16)>>,
    cancelled: AtomicBool,
    submitted: AtomicBool,
}

impl RemoteBackend {
    pub fn new(api_key: impl Into<String>, endpoint: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.unwrap_or(DEFAULT_REMOTE_ENDPOINT).to_string(),
            api_key: api_key.into(),
            samples: Mutex::new(Vec::new()),
            format: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            submitted: AtomicBool::new(false),
        }
    }

    /// Seconds of audio buffered so far.
    pub fn buffered_seconds(&self) -> f64 {
        let samples = self.samples.lock().len();
        match *self.format.lock() {
            Some((rate, channels)) if rate > 0 => {
                samples as f64 / (rate as f64 * channels.max(1) as f64)
            }
            _ => 0.0,
        }
    }
}

#[async_trait]
impl TranscriptionBackend for RemoteBackend {
    fn start(&self, _updates: UnboundedSender<BackendUpdate>) -> Result<()> {
        // Nothing streams; buffering begins with the first feed.
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
        if self.submitted.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }

        let samples = std::mem::take(&mut *self.samples.lock());
        let Some((sample_rate, channels)) = *self.format.lock() else {
            debug!("no audio buffered, skipping remote submission");
            return Ok(None);
        };
        if samples.is_empty() {
            return Ok(None);
        }

        let wav = murmur_audio::encode_wav(&samples, sample_rate, channels)
            .map_err(|e| BackendError::Remote(e.to_string()))?;

        info!(
            wav_bytes = wav.len(),
            seconds = samples.len() as f64 / (sample_rate as f64 * channels.max(1) as f64),
            "Submitting recording for remote transcription"
        );

        let request = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request(&wav))
            .send();

        let response = tokio::time::timeout(SUBMIT_TIMEOUT, request)
            .await
            .map_err(|_| {
                BackendError::Remote(format!(
                    "request timed out after {}s",
                    SUBMIT_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| BackendError::Remote(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Remote(format!(
                "endpoint returned {}: {}",
                status, body
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Remote(e.to_string()))?;
        let transcript = parse_transcript(&body)?;

        Ok(Some(TranscriptUpdate::finished(transcript)))
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.samples.lock().clear();
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn buffer(samples: Vec<f32>) -> AudioBuffer {
        AudioBuffer {
            samples: Arc::from(samples),
            sample_rate: 16_000,
            channels: 1,
        }
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(build_request(b"abc")).unwrap();
        let part = &body["contents"][0]["parts"][0];
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(part["inline_data"]["mime_type"], "audio/wav");
        assert_eq!(part["inline_data"]["data"], BASE64.encode(b"abc"));
    }

    #[test]
    fn test_parse_transcript() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"hello world"}]}}]}"#;
        assert_eq!(parse_transcript(body).unwrap(), "hello world");
    }

    #[test]
    fn test_parse_rejects_missing_candidates() {
        assert!(matches!(
            parse_transcript(r#"{"candidates":[]}"#),
            Err(BackendError::Remote(_))
        ));
        assert!(matches!(
            parse_transcript(r#"{}"#),
            Err(BackendError::Remote(_))
        ));
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        assert!(matches!(
            parse_transcript("not json"),
            Err(BackendError::Remote(_))
        ));
    }

    #[test]
    fn test_feed_accumulates_and_cancel_discards() {
        let backend = RemoteBackend::new("key", None);
        backend.feed(&buffer(vec![0.0; 16_000]));
        assert!((backend.buffered_seconds() - 1.0).abs() < 1e-9);

        backend.cancel();
        assert_eq!(backend.buffered_seconds(), 0.0);

        // Buffers after cancel are dropped.
        backend.feed(&buffer(vec![0.0; 16_000]));
        assert_eq!(backend.buffered_seconds(), 0.0);
    }

    #[tokio::test]
    async fn test_finish_after_cancel_submits_nothing() {
        let backend = RemoteBackend::new("key", None);
        backend.feed(&buffer(vec![0.1; 160]));
        backend.cancel();
        assert!(backend.finish().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_finish_without_audio_submits_nothing() {
        let backend = RemoteBackend::new("key", None);
        assert!(backend.finish().await.unwrap().is_none());
    }

    #[test]
    fn test_default_endpoint_used_when_unset() {
        let backend = RemoteBackend::new("key", None);
        assert_eq!(backend.endpoint, DEFAULT_REMOTE_ENDPOINT);
        let backend = RemoteBackend::new("key", Some("https://example.test/v1"));
        assert_eq!(backend.endpoint, "https://example.test/v1");
    }
}

//! cpal-backed capture stream and tap registry.
//!
//! cpal streams are not `Send`, so the stream lives on a dedicated thread
//! for the lifetime of the capture. `open` returns only once the stream is
//! confirmed playing; `close` shuts the thread down and is idempotent.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::{AudioBuffer, AudioError, AudioSource, Result, TapHandler, TapId};

/// Registry of tap callbacks sharing each captured buffer.
#[derive(Default)]
pub struct TapSet {
    next_id: AtomicU64,
    taps: Mutex<Vec<(TapId, TapHandler)>>,
}

impl TapSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, handler: TapHandler) -> TapId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.taps.lock().push((id, handler));
        id
    }

    pub fn remove(&self, id: TapId) {
        self.taps.lock().retain(|(tap_id, _)| *tap_id != id);
    }

    pub fn clear(&self) {
        self.taps.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.taps.lock().is_empty()
    }

    /// Deliver one buffer to every registered tap, in registration order.
    pub fn dispatch(&self, buffer: &AudioBuffer) {
        for (_, handler) in self.taps.lock().iter() {
            handler(buffer);
        }
    }
}

struct CaptureWorker {
    shutdown: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

/// Real microphone capture via cpal.
#[derive(Default)]
pub struct CpalAudioSource {
    taps: Arc<TapSet>,
    worker: Mutex<Option<CaptureWorker>>,
}

impl CpalAudioSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSource for CpalAudioSource {
    fn open(&self, device: Option<&str>) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            debug!("capture stream already open");
            return Ok(());
        }

        let device_name = device.map(str::to_owned);
        let taps = Arc::clone(&self.taps);
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel();

        let thread = std::thread::spawn(move || {
            capture_thread(device_name.as_deref(), taps, ready_tx, shutdown_rx);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *worker = Some(CaptureWorker {
                    shutdown: shutdown_tx,
                    thread,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                thread.join().ok();
                Err(e)
            }
            Err(_) => {
                thread.join().ok();
                Err(AudioError::Stream(
                    "capture thread exited before the stream started".to_string(),
                ))
            }
        }
    }

    fn add_tap(&self, handler: TapHandler) -> TapId {
        self.taps.add(handler)
    }

    fn remove_tap(&self, id: TapId) {
        self.taps.remove(id);
    }

    fn close(&self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.shutdown.send(()).ok();
            if worker.thread.join().is_err() {
                error!("capture thread panicked during shutdown");
            }
        }
    }

    fn is_open(&self) -> bool {
        self.worker.lock().is_some()
    }
}

impl Drop for CpalAudioSource {
    fn drop(&mut self) {
        self.close();
    }
}

fn capture_thread(
    device_name: Option<&str>,
    taps: Arc<TapSet>,
    ready: mpsc::Sender<std::result::Result<(), AudioError>>,
    shutdown: mpsc::Receiver<()>,
) {
    let stream = match build_stream(device_name, taps) {
        Ok(stream) => {
            ready.send(Ok(())).ok();
            stream
        }
        Err(e) => {
            ready.send(Err(e)).ok();
            return;
        }
    };

    // Park until close() signals (or the source is dropped), keeping the
    // stream alive; buffers keep flowing to taps from cpal's callback.
    shutdown.recv().ok();
    drop(stream);
    info!("capture stream closed");
}

fn build_stream(device_name: Option<&str>, taps: Arc<TapSet>) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(name) => host
            .input_devices()
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| {
                AudioError::DeviceUnavailable(format!("no input device named {name:?}"))
            })?,
        None => host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceUnavailable("no default input device".to_string()))?,
    };

    let config = device
        .default_input_config()
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

    info!(
        device_name = %device.name().unwrap_or_else(|_| "<unknown>".to_string()),
        config = ?config,
        "Capturing from device"
    );

    let sample_rate = config.sample_rate().0;
    let channels = config.channels();

    let err_fn = move |err| {
        error!("an error occurred on stream: {}", err);
    };

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device
            .build_input_stream(
                &config.into(),
                move |data: &[f32], _: &_| {
                    if taps.is_empty() {
                        return;
                    }
                    let buffer = AudioBuffer {
                        samples: Arc::from(data),
                        sample_rate,
                        channels,
                    };
                    taps.dispatch(&buffer);
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::Stream(e.to_string()))?,
        sample_format => {
            return Err(AudioError::UnsupportedFormat(format!("{:?}", sample_format)));
        }
    };

    stream
        .play()
        .map_err(|e| AudioError::Stream(e.to_string()))?;

    Ok(stream)
}

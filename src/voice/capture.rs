//! Audio capture from microphone
//!
//! [`AudioCapturePort`] is the seam the recording controller drives. The cpal
//! implementation keeps its input stream on a dedicated thread because cpal
//! streams are not `Send`.

use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::audio::{SAMPLE_RATE, samples_to_pcm16};

/// Capture device errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// `start` called while a recording is open
    #[error("already recording")]
    AlreadyRecording,

    /// `stop` called with no recording open
    #[error("not recording")]
    NotRecording,

    /// Input device missing or failed to open
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Start/stop recording device producing mono 16-bit PCM
#[async_trait]
pub trait AudioCapturePort: Send {
    /// Open the device and begin buffering samples
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRecording` if a recording is open, or
    /// `DeviceUnavailable` if the device cannot be opened
    async fn start(&mut self) -> Result<(), CaptureError>;

    /// Close the device and return everything captured since `start`
    ///
    /// The buffer is empty if no samples arrived.
    ///
    /// # Errors
    ///
    /// Returns `NotRecording` if no recording is open
    async fn stop(&mut self) -> Result<Vec<u8>, CaptureError>;

    /// Forced teardown: close the device and discard buffered audio
    ///
    /// Safe to call in any state.
    fn release(&mut self);

    /// Whether a recording is currently open
    fn is_recording(&self) -> bool;

    /// Sample rate of produced PCM
    fn sample_rate(&self) -> u32;
}

/// Worker thread owning one open cpal input stream
struct CaptureWorker {
    stop_tx: std_mpsc::Sender<()>,
    handle: JoinHandle<Vec<f32>>,
}

impl CaptureWorker {
    /// Signal the thread and wait for the captured samples
    fn finish(self) -> Option<Vec<f32>> {
        // A closed channel also stops the thread
        let _ = self.stop_tx.send(());
        self.handle.join().ok()
    }
}

/// Captures audio from the default input device
pub struct CpalCapture {
    sample_rate: u32,
    worker: Option<CaptureWorker>,
}

impl CpalCapture {
    /// Create a capture port for the default input device
    ///
    /// The device is opened here so a missing microphone is reported at start-up
    /// rather than on first activation.
    ///
    /// # Errors
    ///
    /// Returns error if no suitable input device exists
    pub fn new(sample_rate: u32) -> Result<Self, CaptureError> {
        let (_, config) = open_input(sample_rate)?;
        tracing::debug!(
            sample_rate,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            sample_rate,
            worker: None,
        })
    }

    /// Create a capture port at the default speech sample rate
    ///
    /// # Errors
    ///
    /// Returns error if no suitable input device exists
    pub fn with_default_rate() -> Result<Self, CaptureError> {
        Self::new(SAMPLE_RATE)
    }
}

#[async_trait]
impl AudioCapturePort for CpalCapture {
    async fn start(&mut self) -> Result<(), CaptureError> {
        if self.worker.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }

        let sample_rate = self.sample_rate;
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), CaptureError>>();

        let handle = std::thread::Builder::new()
            .name("clerk-capture".to_string())
            .spawn(move || capture_thread(sample_rate, &stop_rx, &ready_tx))
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        match ready {
            Ok(Ok(())) => {
                self.worker = Some(CaptureWorker { stop_tx, handle });
                tracing::debug!("audio capture started");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(CaptureError::DeviceUnavailable(
                    "capture thread exited before opening the device".to_string(),
                ))
            }
        }
    }

    async fn stop(&mut self) -> Result<Vec<u8>, CaptureError> {
        let worker = self.worker.take().ok_or(CaptureError::NotRecording)?;

        let samples = tokio::task::spawn_blocking(move || worker.finish())
            .await
            .ok()
            .flatten()
            .ok_or_else(|| CaptureError::DeviceUnavailable("capture thread panicked".to_string()))?;

        tracing::debug!(samples = samples.len(), "audio capture stopped");
        Ok(samples_to_pcm16(&samples))
    }

    fn release(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.finish();
            tracing::debug!("audio capture released");
        }
    }

    fn is_recording(&self) -> bool {
        self.worker.is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.release();
    }
}

/// Find the default input device and a config at `sample_rate`
///
/// Prefers mono; falls back to any channel count, which the capture callback
/// downmixes.
fn open_input(sample_rate: u32) -> Result<(cpal::Device, StreamConfig), CaptureError> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| CaptureError::DeviceUnavailable("no input device available".to_string()))?;

    let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
        c.min_sample_rate() <= SampleRate(sample_rate) && c.max_sample_rate() >= SampleRate(sample_rate)
    };

    let configs: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?
        .collect();

    let supported = configs
        .iter()
        .find(|c| c.channels() == 1 && supports_rate(c))
        .or_else(|| configs.iter().find(|c| supports_rate(c)))
        .cloned()
        .ok_or_else(|| CaptureError::DeviceUnavailable("no suitable audio config found".to_string()))?;

    let config = supported.with_sample_rate(SampleRate(sample_rate)).config();
    Ok((device, config))
}

/// Body of the capture thread: open, buffer until told to stop, hand back samples
fn capture_thread(
    sample_rate: u32,
    stop_rx: &std_mpsc::Receiver<()>,
    ready_tx: &std_mpsc::Sender<Result<(), CaptureError>>,
) -> Vec<f32> {
    let (device, config) = match open_input(sample_rate) {
        Ok(found) => found,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return Vec::new();
        }
    };

    let channels = usize::from(config.channels.max(1));
    let buffer = Arc::new(Mutex::new(Vec::<f32>::new()));
    let sink = Arc::clone(&buffer);

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if let Ok(mut buf) = sink.lock() {
                if channels == 1 {
                    buf.extend_from_slice(data);
                } else {
                    #[allow(clippy::cast_precision_loss)]
                    buf.extend(
                        data.chunks(channels)
                            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
                    );
                }
            }
        },
        |err| {
            tracing::error!(error = %err, "audio capture error");
        },
        None,
    );

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(CaptureError::DeviceUnavailable(e.to_string())));
            return Vec::new();
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(CaptureError::DeviceUnavailable(e.to_string())));
        return Vec::new();
    }

    let _ = ready_tx.send(Ok(()));

    // Returns on an explicit stop or when the port is dropped
    let _ = stop_rx.recv();
    drop(stream);

    buffer
        .lock()
        .map(|mut buf| std::mem::take(&mut *buf))
        .unwrap_or_default()
}

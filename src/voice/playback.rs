//! Audio playback to speakers

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::audio::{decode_mp3, decode_wav, is_wav, resample};

/// Playback failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    /// Audio bytes are neither WAV nor MP3
    #[error("cannot decode audio: {0}")]
    Decode(String),

    /// Output device missing or failed to open
    #[error("playback device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Plays synthesized audio
#[async_trait]
pub trait AudioPlaybackPort: Send + Sync {
    /// Play encoded audio (WAV or MP3) to completion
    ///
    /// # Errors
    ///
    /// See [`PlaybackError`]
    async fn play(&self, audio: &[u8]) -> Result<(), PlaybackError>;
}

/// Decode WAV (by RIFF header) or MP3 into mono samples and their rate
///
/// # Errors
///
/// Returns `Decode` if neither decoder accepts the bytes
pub fn decode_audio(audio: &[u8]) -> Result<(Vec<f32>, u32), PlaybackError> {
    let decoded = if is_wav(audio) {
        decode_wav(audio)
    } else {
        decode_mp3(audio)
    };
    let (samples, rate) = decoded.map_err(|e| PlaybackError::Decode(e.to_string()))?;

    if rate == 0 && !samples.is_empty() {
        return Err(PlaybackError::Decode("missing sample rate".to_string()));
    }
    Ok((samples, rate))
}

/// Plays to the default output device
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalPlayback;

impl CpalPlayback {
    /// Check that an output device exists
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self, PlaybackError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlaybackError::DeviceUnavailable("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );
        Ok(Self)
    }
}

#[async_trait]
impl AudioPlaybackPort for CpalPlayback {
    async fn play(&self, audio: &[u8]) -> Result<(), PlaybackError> {
        let (samples, rate) = decode_audio(audio)?;
        if samples.is_empty() {
            return Ok(());
        }

        // Dropping this future (turn cancelled) silences the worker
        let stop = Arc::new(AtomicBool::new(false));
        let _guard = StopOnDrop(Arc::clone(&stop));

        tokio::task::spawn_blocking(move || play_blocking(samples, rate, &stop))
            .await
            .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?
    }
}

/// Raises the stop flag when dropped
struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// How a wait for the output stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drain {
    Finished,
    Stopped,
    TimedOut,
}

fn wait_for_drain(finished: &AtomicBool, stop: &AtomicBool, timeout: Duration) -> Drain {
    let start = Instant::now();
    loop {
        if stop.load(Ordering::Acquire) {
            return Drain::Stopped;
        }
        if finished.load(Ordering::Acquire) {
            return Drain::Finished;
        }
        if start.elapsed() > timeout {
            return Drain::TimedOut;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Open an output stream at `rate` if possible, else at the device default
fn output_config(device: &cpal::Device, rate: u32) -> Result<StreamConfig, PlaybackError> {
    let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
        c.min_sample_rate() <= SampleRate(rate) && c.max_sample_rate() >= SampleRate(rate)
    };

    let configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?
        .collect();

    let exact = configs
        .iter()
        .find(|c| c.channels() == 1 && supports_rate(c))
        .or_else(|| configs.iter().find(|c| supports_rate(c)));

    if let Some(found) = exact {
        return Ok(found.clone().with_sample_rate(SampleRate(rate)).config());
    }

    device
        .default_output_config()
        .map(|c| c.config())
        .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))
}

/// Play mono samples and block until they have drained
///
/// Returns early, dropping the stream, once `stop` is raised.
fn play_blocking(samples: Vec<f32>, rate: u32, stop: &AtomicBool) -> Result<(), PlaybackError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| PlaybackError::DeviceUnavailable("no output device".to_string()))?;

    let config = output_config(&device, rate)?;
    let samples = if config.sample_rate.0 == rate {
        samples
    } else {
        resample(&samples, rate, config.sample_rate.0)
            .map_err(|e| PlaybackError::Decode(e.to_string()))?
    };

    let channels = usize::from(config.channels.max(1));
    let sample_count = samples.len();
    let finished = Arc::new(AtomicBool::new(false));
    let done = Arc::clone(&finished);
    let mut position = 0usize;

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let sample = samples.get(position).copied().unwrap_or(0.0);
                    frame.fill(sample);
                    if position < samples.len() {
                        position += 1;
                    } else {
                        done.store(true, Ordering::Release);
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?;

    stream
        .play()
        .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?;

    let duration_ms = (sample_count as u64 * 1000) / u64::from(config.sample_rate.0.max(1));
    let timeout = Duration::from_millis(duration_ms + 500);

    match wait_for_drain(&finished, stop, timeout) {
        Drain::Stopped => {
            drop(stream);
            tracing::debug!("playback stopped");
            return Ok(());
        }
        Drain::TimedOut => tracing::warn!("playback timed out before draining"),
        Drain::Finished => {}
    }

    // Let the device flush its last buffer
    std::thread::sleep(Duration::from_millis(100));

    drop(stream);
    tracing::debug!(samples = sample_count, "playback complete");
    Ok(())
}

//! PCM, WAV and MP3 helpers shared by capture, STT and playback

use std::io::Cursor;

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Bytes per captured sample (16-bit PCM)
pub const BYTES_PER_SAMPLE: usize = 2;

/// Minimum number of PCM bytes for a recording of `seconds` at `sample_rate`
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn min_audio_bytes(sample_rate: u32, seconds: f64) -> usize {
    let samples = (f64::from(sample_rate) * seconds.max(0.0)).round() as usize;
    samples * BYTES_PER_SAMPLE
}

/// Duration in seconds of a mono 16-bit PCM buffer
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn pcm_duration_secs(pcm: &[u8], sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    (pcm.len() / BYTES_PER_SAMPLE) as f64 / f64::from(sample_rate)
}

/// Convert f32 samples in [-1.0, 1.0] to little-endian 16-bit PCM bytes
#[must_use]
pub fn samples_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let value = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Convert little-endian 16-bit PCM bytes back to f32 samples
///
/// A trailing odd byte is ignored.
#[must_use]
pub fn pcm16_to_samples(pcm: &[u8]) -> Vec<f32> {
    pcm.chunks_exact(BYTES_PER_SAMPLE)
        .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
        .collect()
}

/// Wrap mono 16-bit PCM bytes in a WAV container
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn pcm16_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for b in pcm.chunks_exact(BYTES_PER_SAMPLE) {
            writer
                .write_sample(i16::from_le_bytes([b[0], b[1]]))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Check for a RIFF/WAVE header
#[must_use]
pub fn is_wav(data: &[u8]) -> bool {
    data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE"
}

/// Decoded WAV payload
#[derive(Debug, Clone)]
pub struct DecodedWav {
    /// Mono 16-bit PCM bytes
    pub pcm: Vec<u8>,
    /// Sample rate from the header
    pub sample_rate: u32,
}

/// Extract mono 16-bit PCM from a WAV file
///
/// Multi-channel input is downmixed by averaging each frame.
///
/// # Errors
///
/// Returns error if the data is not a readable 16-bit integer WAV
pub fn wav_to_pcm16(data: &[u8]) -> Result<DecodedWav> {
    let mut reader =
        hound::WavReader::new(Cursor::new(data)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();

    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(Error::Audio(format!(
            "unsupported WAV format: {} bits {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    let samples: Vec<i16> = reader
        .samples::<i16>()
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::Audio(e.to_string()))?;

    let channels = usize::from(spec.channels.max(1));
    let mut pcm = Vec::with_capacity(samples.len() / channels * BYTES_PER_SAMPLE);
    for frame in samples.chunks(channels) {
        let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let mixed = (sum / frame.len() as i32) as i16;
        pcm.extend_from_slice(&mixed.to_le_bytes());
    }

    Ok(DecodedWav {
        pcm,
        sample_rate: spec.sample_rate,
    })
}

/// Decode WAV bytes to f32 mono samples
///
/// # Errors
///
/// Returns error if the WAV cannot be decoded
pub fn decode_wav(data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let decoded = wav_to_pcm16(data)?;
    Ok((pcm16_to_samples(&decoded.pcm), decoded.sample_rate))
}

/// Decode MP3 bytes to f32 mono samples
///
/// # Errors
///
/// Returns error if a frame fails to decode
pub fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                #[allow(clippy::cast_sign_loss)]
                {
                    sample_rate = frame.sample_rate as u32;
                }

                if frame.channels == 2 {
                    // Stereo: average channels
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok((samples, sample_rate))
}

/// Resampler input chunk, in frames
const RESAMPLE_CHUNK: usize = 1024;

/// Resample mono audio from `from` Hz to `to` Hz
///
/// The trailing partial chunk is zero-padded and the resampler delay trimmed, so
/// the output holds `len * to / from` samples.
///
/// # Errors
///
/// Returns error if either rate is zero or the resampler rejects the ratio
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from == 0 || to == 0 {
        return Err(Error::Audio(format!("invalid resample rates {from} -> {to}")));
    }
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f64>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, 1)
        .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let expected = (samples.len() as f64 * f64::from(to) / f64::from(from)).round() as usize;
    let delay = resampler.output_delay();
    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let mut output: Vec<f64> = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);

    let mut chunks = input.chunks_exact(RESAMPLE_CHUNK);
    for chunk in &mut chunks {
        let result = resampler
            .process(&[chunk], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    let rest = chunks.remainder();
    if !rest.is_empty() {
        let result = resampler
            .process_partial(Some(&[rest][..]), None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    // Drain the delay line
    while output.len() < expected + delay {
        let result = resampler
            .process_partial(None::<&[&[f64]]>, None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        if result[0].is_empty() {
            break;
        }
        output.extend_from_slice(&result[0]);
    }

    Ok(output
        .into_iter()
        .skip(delay)
        .take(expected)
        .map(|s| s as f32)
        .collect())
}

/// Generate a sine tone as f32 samples
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn sine_tone(frequency: f32, duration_secs: f32, amplitude: f32, sample_rate: u32) -> Vec<f32> {
    let count = (sample_rate as f32 * duration_secs.max(0.0)).round() as usize;
    (0..count)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

//! Voice processing module
//!
//! One port per capability (capture, transcription, reply, synthesis,
//! playback) plus the shared audio helpers and the language gate.

use std::time::Duration;

pub mod audio;
mod capture;
mod language;
mod playback;
mod reply;
mod stt;
mod tts;

pub use audio::{SAMPLE_RATE, min_audio_bytes, pcm16_to_wav, samples_to_pcm16};
pub use capture::{AudioCapturePort, CaptureError, CpalCapture};
pub use language::{LanguageGate, LanguageVerdict, is_spanish};
pub use playback::{AudioPlaybackPort, CpalPlayback, PlaybackError, decode_audio};
pub use reply::{
    DEFAULT_GEMINI_MODEL, GeminiReplyGenerator, OFFLINE_DEFAULT_REPLY, OfflineReplyGenerator,
    REPLY_FALLBACK, ReplyGenerationPort,
};
pub use stt::{
    Candidate, DEFAULT_OFFLINE_PHRASE, GoogleSpeechToText, OfflineTranscriber, TranscriptionError,
    TranscriptionPort, WhisperSpeechToText, select_best,
};
pub use tts::{
    DEFAULT_VOICE_ID, GoogleTextToSpeech, OFFLINE_SAMPLE_RATE, OfflineSynthesizer,
    OpenAiTextToSpeech, PITCH_RANGE, SPEAKING_RATE_RANGE, SpeechSynthesisPort, SynthesisError,
    VOICE_CATALOG, VOLUME_GAIN_RANGE, VoiceGender, VoiceInfo, VoiceSettings, find_voice,
};

/// Default limit on one backend request, connect to last byte
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP client whose requests fail after `timeout`
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default HTTP client");
            reqwest::Client::new()
        })
}

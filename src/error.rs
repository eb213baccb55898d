//! Error types for the clerk voice pipeline

use thiserror::Error;

use crate::voice::{CaptureError, PlaybackError, SynthesisError, TranscriptionError};

/// Result type alias for clerk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur outside a single turn
///
/// Turn-level failures never surface as `Error`; the pipeline folds them into a
/// [`crate::pipeline::TurnOutcome`]. This type covers start-up, device and storage
/// problems.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing credential, bad value)
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio encode/decode error
    #[error("audio error: {0}")]
    Audio(String),

    /// Capture device error
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(#[from] TranscriptionError),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(#[from] SynthesisError),

    /// Playback device error
    #[error("playback error: {0}")]
    Playback(#[from] PlaybackError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

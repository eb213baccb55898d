//! Speech-to-text (STT) processing

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::audio::pcm16_to_wav;
use super::{DEFAULT_REQUEST_TIMEOUT, http_client};

/// Google Cloud Speech recognize endpoint
const GOOGLE_SPEECH_URL: &str = "https://speech.googleapis.com/v1/speech:recognize";

/// `OpenAI` transcription endpoint
const WHISPER_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Phrase the offline transcriber hears when nothing else is configured
pub const DEFAULT_OFFLINE_PHRASE: &str = "Hola, ¿dónde están las manzanas?";

/// Transcription failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranscriptionError {
    /// Audio shorter than the minimum recording duration
    #[error("audio too short: {bytes} bytes, need at least {min_bytes}")]
    EmptyAudio { bytes: usize, min_bytes: usize },

    /// Backend returned no usable candidate
    #[error("no speech detected")]
    NoSpeechDetected,

    /// Network, auth, service or parse failure
    #[error("transcription backend error: {0}")]
    Backend(String),
}

impl From<reqwest::Error> for TranscriptionError {
    fn from(e: reqwest::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Speech-to-text capability
#[async_trait]
pub trait TranscriptionPort: Send + Sync {
    /// Transcribe mono 16-bit PCM
    ///
    /// # Arguments
    ///
    /// * `audio` - raw PCM bytes at the port's sample rate
    /// * `language_hint` - BCP-47 code such as `es-ES`
    ///
    /// # Errors
    ///
    /// See [`TranscriptionError`]
    async fn transcribe(&self, audio: &[u8], language_hint: &str)
    -> Result<String, TranscriptionError>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// One recognition hypothesis
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub transcript: String,
    pub confidence: f32,
}

/// Pick the highest-confidence non-blank candidate
///
/// Ties keep the first one seen.
pub fn select_best<I>(candidates: I) -> Option<Candidate>
where
    I: IntoIterator<Item = Candidate>,
{
    candidates
        .into_iter()
        .filter(|c| !c.transcript.trim().is_empty())
        .fold(None, |best: Option<Candidate>, c| match best {
            Some(b) if b.confidence >= c.confidence => Some(b),
            _ => Some(c),
        })
}

fn check_length(audio: &[u8], min_bytes: usize) -> Result<(), TranscriptionError> {
    if audio.len() < min_bytes {
        return Err(TranscriptionError::EmptyAudio {
            bytes: audio.len(),
            min_bytes,
        });
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig<'a> {
    encoding: &'static str,
    sample_rate_hertz: u32,
    language_code: &'a str,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    alternative_language_codes: &'a [String],
    enable_automatic_punctuation: bool,
    model: &'a str,
    use_enhanced: bool,
}

#[derive(Serialize)]
struct RecognitionAudio {
    content: String,
}

#[derive(Serialize)]
struct RecognizeRequest<'a> {
    config: RecognitionConfig<'a>,
    audio: RecognitionAudio,
}

#[derive(Debug, Default, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

#[derive(Debug, Deserialize)]
struct RecognitionResult {
    #[serde(default)]
    alternatives: Vec<RecognitionAlternative>,
}

#[derive(Debug, Deserialize)]
struct RecognitionAlternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: f32,
}

impl RecognizeResponse {
    fn best_transcript(self) -> Result<Candidate, TranscriptionError> {
        let candidates = self
            .results
            .into_iter()
            .flat_map(|r| r.alternatives)
            .map(|a| Candidate {
                transcript: a.transcript.trim().to_string(),
                confidence: a.confidence,
            });

        select_best(candidates).ok_or(TranscriptionError::NoSpeechDetected)
    }
}

/// Google Cloud Speech-to-Text over REST
pub struct GoogleSpeechToText {
    client: reqwest::Client,
    api_key: SecretString,
    url: String,
    model: String,
    sample_rate: u32,
    min_audio_bytes: usize,
    alternative_languages: Vec<String>,
}

impl GoogleSpeechToText {
    /// Create a Google STT client
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API key is empty
    pub fn new(
        api_key: SecretString,
        model: String,
        sample_rate: u32,
        min_audio_bytes: usize,
    ) -> crate::Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(crate::Error::Config(
                "Google API key required for speech recognition".to_string(),
            ));
        }

        Ok(Self {
            client: http_client(DEFAULT_REQUEST_TIMEOUT),
            api_key,
            url: GOOGLE_SPEECH_URL.to_string(),
            model,
            sample_rate,
            min_audio_bytes,
            alternative_languages: Vec::new(),
        })
    }

    /// Limit each request to `timeout`
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    /// Additional language codes the recognizer may match (e.g. `es-MX`)
    #[must_use]
    pub fn alternative_languages(mut self, codes: Vec<String>) -> Self {
        self.alternative_languages = codes;
        self
    }

    /// Override the endpoint (proxies, emulators)
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl TranscriptionPort for GoogleSpeechToText {
    async fn transcribe(
        &self,
        audio: &[u8],
        language_hint: &str,
    ) -> Result<String, TranscriptionError> {
        check_length(audio, self.min_audio_bytes)?;
        tracing::debug!(audio_bytes = audio.len(), language = language_hint, "starting Google transcription");

        let request = RecognizeRequest {
            config: RecognitionConfig {
                encoding: "LINEAR16",
                sample_rate_hertz: self.sample_rate,
                language_code: language_hint,
                alternative_language_codes: &self.alternative_languages,
                enable_automatic_punctuation: true,
                model: &self.model,
                use_enhanced: true,
            },
            audio: RecognitionAudio {
                content: BASE64.encode(audio),
            },
        };

        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Google speech request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Google speech API error");
            return Err(TranscriptionError::Backend(format!(
                "Google speech API error {status}: {body}"
            )));
        }

        let result: RecognizeResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse Google speech response");
            e
        })?;

        let best = result.best_transcript()?;
        tracing::info!(transcript = %best.transcript, confidence = best.confidence, "transcription complete");
        Ok(best.transcript)
    }

    fn name(&self) -> &'static str {
        "google"
    }
}

/// Response from `OpenAI` Whisper transcription API
#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
}

/// `OpenAI` Whisper transcription
pub struct WhisperSpeechToText {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    sample_rate: u32,
    min_audio_bytes: usize,
}

impl WhisperSpeechToText {
    /// Create a Whisper client
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API key is empty
    pub fn new(
        api_key: SecretString,
        model: String,
        sample_rate: u32,
        min_audio_bytes: usize,
    ) -> crate::Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(crate::Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }

        Ok(Self {
            client: http_client(DEFAULT_REQUEST_TIMEOUT),
            api_key,
            model,
            sample_rate,
            min_audio_bytes,
        })
    }

    /// Limit each request to `timeout`
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }
}

#[async_trait]
impl TranscriptionPort for WhisperSpeechToText {
    async fn transcribe(
        &self,
        audio: &[u8],
        language_hint: &str,
    ) -> Result<String, TranscriptionError> {
        check_length(audio, self.min_audio_bytes)?;
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let wav = pcm16_to_wav(audio, self.sample_rate)
            .map_err(|e| TranscriptionError::Backend(e.to_string()))?;

        // Whisper takes ISO-639-1, not a full locale
        let language = language_hint
            .split(['-', '_'])
            .next()
            .unwrap_or(language_hint)
            .to_lowercase();

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")?,
            )
            .text("model", self.model.clone())
            .text("language", language);

        let response = self
            .client
            .post(WHISPER_URL)
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(TranscriptionError::Backend(format!(
                "Whisper API error {status}: {body}"
            )));
        }

        let result: WhisperResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            e
        })?;

        let text = result.text.trim();
        if text.is_empty() {
            return Err(TranscriptionError::NoSpeechDetected);
        }

        tracing::info!(transcript = %text, "transcription complete");
        Ok(text.to_string())
    }

    fn name(&self) -> &'static str {
        "whisper"
    }
}

/// Scripted transcriber for running without credentials
///
/// Hears the same configured phrase for every recording long enough to pass
/// the duration check.
pub struct OfflineTranscriber {
    phrase: String,
    min_audio_bytes: usize,
}

impl OfflineTranscriber {
    #[must_use]
    pub fn new(phrase: impl Into<String>, min_audio_bytes: usize) -> Self {
        Self {
            phrase: phrase.into(),
            min_audio_bytes,
        }
    }
}

#[async_trait]
impl TranscriptionPort for OfflineTranscriber {
    async fn transcribe(
        &self,
        audio: &[u8],
        _language_hint: &str,
    ) -> Result<String, TranscriptionError> {
        check_length(audio, self.min_audio_bytes)?;
        if self.phrase.trim().is_empty() {
            return Err(TranscriptionError::NoSpeechDetected);
        }
        tracing::info!(transcript = %self.phrase, "offline transcription");
        Ok(self.phrase.clone())
    }

    fn name(&self) -> &'static str {
        "offline"
    }
}

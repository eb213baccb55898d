//! Text-to-speech (TTS) processing

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::audio::{pcm16_to_wav, samples_to_pcm16, sine_tone};
use super::{DEFAULT_REQUEST_TIMEOUT, http_client};

/// Google Cloud Text-to-Speech endpoint
const GOOGLE_TTS_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

/// `OpenAI` speech endpoint
const OPENAI_TTS_URL: &str = "https://api.openai.com/v1/audio/speech";

/// Sample rate of the offline placeholder tone
pub const OFFLINE_SAMPLE_RATE: u32 = 24000;

/// Synthesis failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisError {
    /// Nothing to say
    #[error("empty text")]
    EmptyText,

    /// Network, auth, service or decode failure
    #[error("synthesis backend error: {0}")]
    Backend(String),
}

impl From<reqwest::Error> for SynthesisError {
    fn from(e: reqwest::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Voice gender as reported to the synthesis backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceGender {
    Female,
    Male,
}

impl VoiceGender {
    /// `ssmlGender` wire value
    #[must_use]
    pub const fn as_ssml(self) -> &'static str {
        match self {
            Self::Female => "FEMALE",
            Self::Male => "MALE",
        }
    }
}

/// A selectable voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceInfo {
    pub id: &'static str,
    pub gender: VoiceGender,
    pub description: &'static str,
}

/// Spanish voices offered by the setup wizard and `clerk voices`
pub const VOICE_CATALOG: &[VoiceInfo] = &[
    VoiceInfo {
        id: "es-ES-Standard-A",
        gender: VoiceGender::Female,
        description: "Standard, female",
    },
    VoiceInfo {
        id: "es-ES-Standard-B",
        gender: VoiceGender::Male,
        description: "Standard, male",
    },
    VoiceInfo {
        id: "es-ES-Wavenet-C",
        gender: VoiceGender::Female,
        description: "WaveNet, female",
    },
    VoiceInfo {
        id: "es-ES-Wavenet-B",
        gender: VoiceGender::Male,
        description: "WaveNet, male",
    },
    VoiceInfo {
        id: "es-ES-Neural2-A",
        gender: VoiceGender::Female,
        description: "Neural2, female (default)",
    },
    VoiceInfo {
        id: "es-ES-Neural2-B",
        gender: VoiceGender::Male,
        description: "Neural2, male",
    },
];

/// Default voice id
pub const DEFAULT_VOICE_ID: &str = "es-ES-Neural2-A";

/// Look up a catalog voice
#[must_use]
pub fn find_voice(id: &str) -> Option<&'static VoiceInfo> {
    VOICE_CATALOG.iter().find(|v| v.id == id)
}

/// Speaking rate bounds
pub const SPEAKING_RATE_RANGE: (f32, f32) = (0.25, 4.0);
/// Pitch bounds in semitones
pub const PITCH_RANGE: (f32, f32) = (-20.0, 20.0);
/// Volume gain bounds in dB
pub const VOLUME_GAIN_RANGE: (f32, f32) = (-96.0, 16.0);

/// Voice and prosody for synthesis
///
/// Every setter clamps into the backend's accepted range, so a constructed
/// value is always valid.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    voice_id: String,
    language_code: String,
    speaking_rate: f32,
    pitch: f32,
    volume_gain_db: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            voice_id: DEFAULT_VOICE_ID.to_string(),
            language_code: "es-ES".to_string(),
            speaking_rate: 1.0,
            pitch: 0.0,
            volume_gain_db: 0.0,
        }
    }
}

impl VoiceSettings {
    #[must_use]
    pub fn voice_id(&self) -> &str {
        &self.voice_id
    }

    #[must_use]
    pub fn language_code(&self) -> &str {
        &self.language_code
    }

    #[must_use]
    pub const fn speaking_rate(&self) -> f32 {
        self.speaking_rate
    }

    #[must_use]
    pub const fn pitch(&self) -> f32 {
        self.pitch
    }

    #[must_use]
    pub const fn volume_gain_db(&self) -> f32 {
        self.volume_gain_db
    }

    /// Gender of the selected voice
    ///
    /// Catalog voices report their own; others follow the `-A`/`-C` female
    /// naming convention.
    #[must_use]
    pub fn gender(&self) -> VoiceGender {
        if let Some(info) = find_voice(&self.voice_id) {
            return info.gender;
        }
        if self.voice_id.ends_with("-A") || self.voice_id.ends_with("-C") {
            VoiceGender::Female
        } else {
            VoiceGender::Male
        }
    }

    /// Select a catalog voice
    ///
    /// Unknown ids are rejected and the current voice kept. Returns whether the
    /// voice changed.
    pub fn set_voice(&mut self, voice_id: &str) -> bool {
        if find_voice(voice_id).is_none() {
            tracing::warn!(voice_id, current = %self.voice_id, "unknown voice, keeping current");
            return false;
        }
        self.voice_id = voice_id.to_string();
        true
    }

    pub fn set_language_code(&mut self, code: impl Into<String>) {
        self.language_code = code.into();
    }

    pub fn set_speaking_rate(&mut self, rate: f32) {
        self.speaking_rate = clamp(rate, SPEAKING_RATE_RANGE, 1.0);
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = clamp(pitch, PITCH_RANGE, 0.0);
    }

    pub fn set_volume_gain_db(&mut self, gain: f32) {
        self.volume_gain_db = clamp(gain, VOLUME_GAIN_RANGE, 0.0);
    }

    /// Builder-style voice selection
    #[must_use]
    pub fn with_voice(mut self, voice_id: &str) -> Self {
        self.set_voice(voice_id);
        self
    }

    #[must_use]
    pub fn with_speaking_rate(mut self, rate: f32) -> Self {
        self.set_speaking_rate(rate);
        self
    }

    #[must_use]
    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.set_pitch(pitch);
        self
    }

    #[must_use]
    pub fn with_volume_gain_db(mut self, gain: f32) -> Self {
        self.set_volume_gain_db(gain);
        self
    }
}

/// NaN falls back to `neutral`
fn clamp(value: f32, (min, max): (f32, f32), neutral: f32) -> f32 {
    if value.is_nan() {
        neutral
    } else {
        value.clamp(min, max)
    }
}

/// Text-to-speech capability
#[async_trait]
pub trait SpeechSynthesisPort: Send + Sync {
    /// Render `text` to encoded audio (MP3 or WAV)
    ///
    /// # Errors
    ///
    /// See [`SynthesisError`]
    async fn synthesize(&self, text: &str, voice: &VoiceSettings) -> Result<Vec<u8>, SynthesisError>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    #[serde(rename = "audioConfig")]
    audio_config: AudioConfig,
}

#[derive(Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
    ssml_gender: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    speaking_rate: f32,
    pitch: f32,
    volume_gain_db: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(default)]
    audio_content: String,
}

/// Google Cloud Text-to-Speech over REST
pub struct GoogleTextToSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    url: String,
}

impl GoogleTextToSpeech {
    /// Create a Google TTS client
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API key is empty
    pub fn new(api_key: SecretString) -> crate::Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(crate::Error::Config(
                "Google API key required for TTS".to_string(),
            ));
        }

        Ok(Self {
            client: http_client(DEFAULT_REQUEST_TIMEOUT),
            api_key,
            url: GOOGLE_TTS_URL.to_string(),
        })
    }

    /// Limit each request to `timeout`
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    /// Override the endpoint
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl SpeechSynthesisPort for GoogleTextToSpeech {
    async fn synthesize(&self, text: &str, voice: &VoiceSettings) -> Result<Vec<u8>, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        let request = SynthesizeRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: voice.language_code(),
                name: voice.voice_id(),
                ssml_gender: voice.gender().as_ssml(),
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
                speaking_rate: voice.speaking_rate(),
                pitch: voice.pitch(),
                volume_gain_db: voice.volume_gain_db(),
            },
        };

        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Backend(format!("Google TTS error {status}: {body}")));
        }

        let result: SynthesizeResponse = response.json().await?;
        let audio = BASE64
            .decode(result.audio_content.as_bytes())
            .map_err(|e| SynthesisError::Backend(format!("invalid audioContent: {e}")))?;

        if audio.is_empty() {
            return Err(SynthesisError::Backend("Google TTS returned no audio".to_string()));
        }

        tracing::debug!(bytes = audio.len(), voice = voice.voice_id(), "speech synthesized");
        Ok(audio)
    }

    fn name(&self) -> &'static str {
        "google"
    }
}

/// `OpenAI` speech synthesis
///
/// Uses its own voice name; pitch and volume are not supported and ignored.
pub struct OpenAiTextToSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    voice: String,
    model: String,
}

impl OpenAiTextToSpeech {
    /// Create an `OpenAI` TTS client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: SecretString, voice: String, model: String) -> crate::Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(crate::Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: http_client(DEFAULT_REQUEST_TIMEOUT),
            api_key,
            voice,
            model,
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
impl SpeechSynthesisPort for OpenAiTextToSpeech {
    async fn synthesize(&self, text: &str, voice: &VoiceSettings) -> Result<Vec<u8>, SynthesisError> {
        #[derive(Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: voice.speaking_rate(),
        };

        let response = self
            .client
            .post(OPENAI_TTS_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Backend(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Placeholder synthesizer: a beep whose length follows the text
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineSynthesizer;

impl OfflineSynthesizer {
    /// 50 ms per character, between 1 and 8 seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(text: &str) -> f32 {
        (text.chars().count() as f32 * 0.05).clamp(1.0, 8.0)
    }
}

#[async_trait]
impl SpeechSynthesisPort for OfflineSynthesizer {
    async fn synthesize(&self, text: &str, _voice: &VoiceSettings) -> Result<Vec<u8>, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        let tone = sine_tone(440.0, Self::duration_secs(text), 0.3, OFFLINE_SAMPLE_RATE);
        pcm16_to_wav(&samples_to_pcm16(&tone), OFFLINE_SAMPLE_RATE)
            .map_err(|e| SynthesisError::Backend(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "offline"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::audio::{is_wav, wav_to_pcm16};

    #[test]
    fn setters_clamp_into_range() {
        let settings = VoiceSettings::default()
            .with_speaking_rate(10.0)
            .with_pitch(-50.0)
            .with_volume_gain_db(30.0);

        assert!((settings.speaking_rate() - 4.0).abs() < f32::EPSILON);
        assert!((settings.pitch() + 20.0).abs() < f32::EPSILON);
        assert!((settings.volume_gain_db() - 16.0).abs() < f32::EPSILON);

        let settings = VoiceSettings::default().with_speaking_rate(0.0).with_volume_gain_db(-200.0);
        assert!((settings.speaking_rate() - 0.25).abs() < f32::EPSILON);
        assert!((settings.volume_gain_db() + 96.0).abs() < f32::EPSILON);
    }

    #[test]
    fn nan_resets_to_neutral() {
        let settings = VoiceSettings::default().with_speaking_rate(f32::NAN).with_pitch(f32::NAN);
        assert!((settings.speaking_rate() - 1.0).abs() < f32::EPSILON);
        assert!(settings.pitch().abs() < f32::EPSILON);
    }

    #[test]
    fn unknown_voice_keeps_current() {
        let mut settings = VoiceSettings::default();
        assert!(!settings.set_voice("en-US-Fake-Z"));
        assert_eq!(settings.voice_id(), DEFAULT_VOICE_ID);

        assert!(settings.set_voice("es-ES-Wavenet-B"));
        assert_eq!(settings.voice_id(), "es-ES-Wavenet-B");
        assert_eq!(settings.gender(), VoiceGender::Male);
    }

    #[test]
    fn catalog_genders() {
        for voice in VOICE_CATALOG {
            let expected = if voice.id.ends_with("-A") || voice.id.ends_with("-C") {
                VoiceGender::Female
            } else {
                VoiceGender::Male
            };
            assert_eq!(voice.gender, expected, "{}", voice.id);
        }
        assert!(find_voice(DEFAULT_VOICE_ID).is_some());
    }

    #[test]
    fn google_request_wire_shape() {
        let settings = VoiceSettings::default().with_speaking_rate(0.9);
        let request = SynthesizeRequest {
            input: SynthesisInput { text: "Hola" },
            voice: VoiceSelection {
                language_code: settings.language_code(),
                name: settings.voice_id(),
                ssml_gender: settings.gender().as_ssml(),
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
                speaking_rate: settings.speaking_rate(),
                pitch: settings.pitch(),
                volume_gain_db: settings.volume_gain_db(),
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["input"]["text"], "Hola");
        assert_eq!(json["voice"]["languageCode"], "es-ES");
        assert_eq!(json["voice"]["name"], "es-ES-Neural2-A");
        assert_eq!(json["voice"]["ssmlGender"], "FEMALE");
        assert_eq!(json["audioConfig"]["audioEncoding"], "MP3");
        assert!(json["audioConfig"]["volumeGainDb"].is_number());
    }

    #[test]
    fn offline_beep_length_scales_with_text() {
        assert!((OfflineSynthesizer::duration_secs("hola") - 1.0).abs() < f32::EPSILON);
        assert!((OfflineSynthesizer::duration_secs(&"a".repeat(60)) - 3.0).abs() < 1e-4);
        assert!((OfflineSynthesizer::duration_secs(&"a".repeat(1000)) - 8.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn silent_backend_is_a_backend_error() {
        let url = crate::voice::test_support::silent_server().await;
        let tts = GoogleTextToSpeech::new(SecretString::from("k".to_string()))
            .unwrap()
            .url(url)
            .request_timeout(Duration::from_millis(200));

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            tts.synthesize("Hola", &VoiceSettings::default()),
        )
        .await
        .expect("request timeout did not fire");
        assert!(matches!(result, Err(SynthesisError::Backend(_))));
    }

    #[tokio::test]
    async fn offline_synthesizer_produces_wav() {
        let audio = OfflineSynthesizer
            .synthesize("Hola", &VoiceSettings::default())
            .await
            .unwrap();

        assert!(is_wav(&audio));
        let decoded = wav_to_pcm16(&audio).unwrap();
        assert_eq!(decoded.sample_rate, OFFLINE_SAMPLE_RATE);
        assert_eq!(decoded.pcm.len(), OFFLINE_SAMPLE_RATE as usize * 2);
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let result = OfflineSynthesizer.synthesize("  ", &VoiceSettings::default()).await;
        assert_eq!(result, Err(SynthesisError::EmptyText));
    }
}

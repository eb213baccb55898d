//! Configuration management for the clerk
//!
//! Every setting resolves env > TOML file > default.

pub mod file;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::pipeline::DEFAULT_MIN_RECORDING_SECS;
use crate::voice::{
    DEFAULT_GEMINI_MODEL, DEFAULT_REQUEST_TIMEOUT, SAMPLE_RATE, VoiceSettings, min_audio_bytes,
};
use crate::{Error, Result};

pub use file::{ClerkConfigFile, config_file_path, load_config_file};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 18800;

/// Speech-to-text backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttProvider {
    Google,
    Whisper,
    Offline,
}

/// Reply backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyProvider {
    Gemini,
    Offline,
}

/// Text-to-speech backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsProvider {
    Google,
    OpenAi,
    Offline,
}

fn unknown_provider(section: &str, value: &str, expected: &str) -> Error {
    Error::Config(format!(
        "unknown {section} provider {value:?} (expected one of: {expected})"
    ))
}

impl FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "whisper" | "openai" => Ok(Self::Whisper),
            "offline" => Ok(Self::Offline),
            other => Err(unknown_provider("stt", other, "google, whisper, offline")),
        }
    }
}

impl FromStr for ReplyProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "offline" => Ok(Self::Offline),
            other => Err(unknown_provider("reply", other, "gemini, offline")),
        }
    }
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "openai" => Ok(Self::OpenAi),
            "offline" => Ok(Self::Offline),
            other => Err(unknown_provider("tts", other, "google, openai, offline")),
        }
    }
}

impl fmt::Display for SttProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Google => "google",
            Self::Whisper => "whisper",
            Self::Offline => "offline",
        })
    }
}

impl fmt::Display for ReplyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gemini => "gemini",
            Self::Offline => "offline",
        })
    }
}

impl fmt::Display for TtsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Google => "google",
            Self::OpenAi => "openai",
            Self::Offline => "offline",
        })
    }
}

/// Turn pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Target language code
    pub language: String,

    /// Extra recognizer languages
    pub alternative_languages: Vec<String>,

    /// Minimum recording duration in seconds
    pub min_recording_secs: f64,

    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Limit on each cloud backend request
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SttConfig {
    pub provider: SttProvider,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct ReplyConfig {
    pub provider: ReplyProvider,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub provider: TtsProvider,
    pub model: String,

    /// Voice name for `OpenAI`, which has its own voice set
    pub openai_voice: String,
}

/// Console key bindings
#[derive(Debug, Clone)]
pub struct ActivationConfig {
    /// Input line that toggles recording (empty = Enter)
    pub key: String,

    /// Input line that cancels and exits
    pub cancel_key: String,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
}

/// API keys for external services
#[derive(Debug, Default)]
pub struct ApiKeys {
    /// Google Cloud key (Speech-to-Text and Text-to-Speech)
    pub google: Option<SecretString>,

    /// Gemini key; falls back to the Google key
    pub gemini: Option<SecretString>,

    /// `OpenAI` key (Whisper and TTS)
    pub openai: Option<SecretString>,
}

/// Clerk configuration
#[derive(Debug)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub voice: VoiceSettings,
    pub stt: SttConfig,
    pub reply: ReplyConfig,
    pub tts: TtsConfig,
    pub activation: ActivationConfig,
    pub server: ServerConfig,
    pub api_keys: ApiKeys,

    /// Path to data directory (turn database)
    pub data_dir: PathBuf,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is not recognized
    pub fn load() -> Result<Self> {
        Self::from_sources(load_config_file(), |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is not recognized
    pub fn from_sources<F>(fc: ClerkConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        // Pipeline (env > toml > default)
        let pipeline = PipelineConfig {
            language: lookup("CLERK_LANGUAGE")
                .or(fc.pipeline.language)
                .unwrap_or_else(|| "es-ES".to_string()),
            alternative_languages: fc
                .pipeline
                .alternative_languages
                .unwrap_or_else(|| vec!["es-MX".to_string(), "es-US".to_string()]),
            min_recording_secs: fc
                .pipeline
                .min_recording_secs
                .filter(|s| s.is_finite() && *s >= 0.0)
                .unwrap_or(DEFAULT_MIN_RECORDING_SECS),
            sample_rate: fc
                .pipeline
                .sample_rate
                .filter(|r| *r > 0)
                .unwrap_or(SAMPLE_RATE),
            request_timeout: lookup("CLERK_REQUEST_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .or(fc.pipeline.request_timeout_secs)
                .filter(|secs| *secs > 0)
                .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs),
        };

        // Voice (toml > default), clamped by the setters
        let mut voice = VoiceSettings::default();
        voice.set_language_code(pipeline.language.clone());
        if let Some(id) = fc.voice.voice_id.as_deref() {
            voice.set_voice(id);
        }
        if let Some(rate) = fc.voice.speaking_rate {
            voice.set_speaking_rate(rate);
        }
        if let Some(pitch) = fc.voice.pitch {
            voice.set_pitch(pitch);
        }
        if let Some(gain) = fc.voice.volume_gain_db {
            voice.set_volume_gain_db(gain);
        }

        // Backends (env > toml > default)
        let stt_provider: SttProvider = lookup("CLERK_STT_PROVIDER")
            .or(fc.stt.provider)
            .map_or(Ok(SttProvider::Google), |s| s.parse())?;
        let stt = SttConfig {
            provider: stt_provider,
            model: fc.stt.model.unwrap_or_else(|| match stt_provider {
                SttProvider::Whisper => "whisper-1".to_string(),
                _ => "latest_long".to_string(),
            }),
        };

        let reply = ReplyConfig {
            provider: lookup("CLERK_REPLY_PROVIDER")
                .or(fc.reply.provider)
                .map_or(Ok(ReplyProvider::Gemini), |s| s.parse())?,
            model: fc
                .reply
                .model
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        };

        let tts = TtsConfig {
            provider: lookup("CLERK_TTS_PROVIDER")
                .or(fc.tts.provider)
                .map_or(Ok(TtsProvider::Google), |s| s.parse())?,
            model: fc.tts.model.unwrap_or_else(|| "tts-1".to_string()),
            openai_voice: fc.tts.voice.unwrap_or_else(|| "nova".to_string()),
        };

        let activation = ActivationConfig {
            key: fc.activation.key.unwrap_or_default(),
            cancel_key: fc.activation.cancel_key.unwrap_or_else(|| "q".to_string()),
        };

        // API server config (env > toml > default)
        let server = ServerConfig {
            port: lookup("CLERK_PORT")
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
        };

        // API keys (env > toml > None)
        let secret = |value: Option<String>| {
            value
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
        };
        let api_keys = ApiKeys {
            google: secret(lookup("GOOGLE_API_KEY").or(fc.api_keys.google)),
            gemini: secret(lookup("GEMINI_API_KEY").or(fc.api_keys.gemini)),
            openai: secret(lookup("OPENAI_API_KEY").or(fc.api_keys.openai)),
        };

        // Data directory (~/.local/share/clerk-voice on Linux)
        let data_dir = lookup("CLERK_DATA_DIR").map_or_else(
            || {
                directories::BaseDirs::new()
                    .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("clerk-voice"))
            },
            PathBuf::from,
        );

        Ok(Self {
            pipeline,
            voice,
            stt,
            reply,
            tts,
            activation,
            server,
            api_keys,
            data_dir,
        })
    }

    /// Switch every backend to its offline implementation
    #[must_use]
    pub fn offline(mut self) -> Self {
        self.stt.provider = SttProvider::Offline;
        self.reply.provider = ReplyProvider::Offline;
        self.tts.provider = TtsProvider::Offline;
        self
    }

    /// Minimum recording length in PCM bytes
    #[must_use]
    pub fn min_audio_bytes(&self) -> usize {
        min_audio_bytes(self.pipeline.sample_rate, self.pipeline.min_recording_secs)
    }

    /// Path of the turn database
    #[must_use]
    pub fn turns_db_path(&self) -> PathBuf {
        self.data_dir.join("turns.db")
    }

    /// Key for Google Speech/TTS
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no key is set
    pub fn google_key(&self) -> Result<SecretString> {
        copy_key(self.api_keys.google.as_ref(), "GOOGLE_API_KEY", "google")
    }

    /// Key for Gemini, falling back to the Google key
    ///
    /// # Errors
    ///
    /// Returns a configuration error if neither key is set
    pub fn gemini_key(&self) -> Result<SecretString> {
        copy_key(
            self.api_keys.gemini.as_ref().or(self.api_keys.google.as_ref()),
            "GEMINI_API_KEY",
            "gemini",
        )
    }

    /// Key for `OpenAI`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no key is set
    pub fn openai_key(&self) -> Result<SecretString> {
        copy_key(self.api_keys.openai.as_ref(), "OPENAI_API_KEY", "openai")
    }

    /// Check that every selected cloud backend has a credential
    ///
    /// # Errors
    ///
    /// Returns the first missing-credential error
    pub fn validate(&self) -> Result<()> {
        match self.stt.provider {
            SttProvider::Google => drop(self.google_key()?),
            SttProvider::Whisper => drop(self.openai_key()?),
            SttProvider::Offline => {}
        }
        if self.reply.provider == ReplyProvider::Gemini {
            drop(self.gemini_key()?);
        }
        match self.tts.provider {
            TtsProvider::Google => drop(self.google_key()?),
            TtsProvider::OpenAi => drop(self.openai_key()?),
            TtsProvider::Offline => {}
        }
        Ok(())
    }
}

fn copy_key(key: Option<&SecretString>, env_var: &str, label: &str) -> Result<SecretString> {
    key.map(|k| SecretString::from(k.expose_secret().to_owned()))
        .ok_or_else(|| {
            Error::Config(format!(
                "{env_var} not set; required by the {label} backend (set it or [api_keys].{label} in the config file, or run with --offline)"
            ))
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_sources() {
        let config = Config::from_sources(ClerkConfigFile::default(), env_of(&[])).unwrap();

        assert_eq!(config.pipeline.language, "es-ES");
        assert_eq!(config.pipeline.alternative_languages, ["es-MX", "es-US"]);
        assert_eq!(config.min_audio_bytes(), 16000);
        assert_eq!(config.stt.provider, SttProvider::Google);
        assert_eq!(config.stt.model, "latest_long");
        assert_eq!(config.reply.provider, ReplyProvider::Gemini);
        assert_eq!(config.reply.model, "gemini-2.0-flash");
        assert_eq!(config.tts.provider, TtsProvider::Google);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.activation.key, "");
        assert_eq!(config.activation.cancel_key, "q");
        assert_eq!(config.voice.voice_id(), "es-ES-Neural2-A");
        assert!(config.api_keys.google.is_none());
    }

    #[test]
    fn env_beats_file_beats_default() {
        let fc = file::parse_config(
            r#"
            [pipeline]
            language = "es-MX"
            [server]
            port = 9000
            [stt]
            provider = "whisper"
            [api_keys]
            google = "file-key"
            openai = "file-openai"
            "#,
        )
        .unwrap();

        let config = Config::from_sources(
            fc,
            env_of(&[
                ("CLERK_PORT", "9100"),
                ("GOOGLE_API_KEY", "env-key"),
                ("CLERK_STT_PROVIDER", "offline"),
            ]),
        )
        .unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.pipeline.language, "es-MX");
        assert_eq!(config.voice.language_code(), "es-MX");
        assert_eq!(config.stt.provider, SttProvider::Offline);
        assert_eq!(config.google_key().unwrap().expose_secret(), "env-key");
        assert_eq!(config.openai_key().unwrap().expose_secret(), "file-openai");
    }

    #[test]
    fn unparseable_port_falls_through() {
        let fc = file::parse_config("[server]\nport = 9000").unwrap();
        let config = Config::from_sources(fc, env_of(&[("CLERK_PORT", "abc")])).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn request_timeout_resolution() {
        let config = Config::from_sources(ClerkConfigFile::default(), env_of(&[])).unwrap();
        assert_eq!(config.pipeline.request_timeout, DEFAULT_REQUEST_TIMEOUT);

        let fc = file::parse_config("[pipeline]\nrequest_timeout_secs = 30").unwrap();
        let config = Config::from_sources(fc, env_of(&[])).unwrap();
        assert_eq!(config.pipeline.request_timeout, Duration::from_secs(30));

        let fc = file::parse_config("[pipeline]\nrequest_timeout_secs = 30").unwrap();
        let config =
            Config::from_sources(fc, env_of(&[("CLERK_REQUEST_TIMEOUT_SECS", "5")])).unwrap();
        assert_eq!(config.pipeline.request_timeout, Duration::from_secs(5));

        // Zero would disable the limit
        let config = Config::from_sources(
            ClerkConfigFile::default(),
            env_of(&[("CLERK_REQUEST_TIMEOUT_SECS", "0")]),
        )
        .unwrap();
        assert_eq!(config.pipeline.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn unknown_provider_is_config_error() {
        let result = Config::from_sources(
            ClerkConfigFile::default(),
            env_of(&[("CLERK_TTS_PROVIDER", "espeak")]),
        );
        assert!(matches!(result, Err(Error::Config(m)) if m.contains("espeak")));
    }

    #[test]
    fn missing_credentials_fail_validation() {
        let config = Config::from_sources(ClerkConfigFile::default(), env_of(&[])).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(m) if m.contains("GOOGLE_API_KEY")));

        let config = Config::from_sources(
            ClerkConfigFile::default(),
            env_of(&[("GOOGLE_API_KEY", "g")]),
        )
        .unwrap();
        // Gemini falls back to the Google key
        assert!(config.validate().is_ok());
        assert_eq!(config.gemini_key().unwrap().expose_secret(), "g");
    }

    #[test]
    fn blank_keys_count_as_missing() {
        let config = Config::from_sources(
            ClerkConfigFile::default(),
            env_of(&[("GOOGLE_API_KEY", "   ")]),
        )
        .unwrap();
        assert!(config.google_key().is_err());
    }

    #[test]
    fn offline_needs_no_credentials() {
        let config = Config::from_sources(ClerkConfigFile::default(), env_of(&[]))
            .unwrap()
            .offline();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn voice_section_is_clamped() {
        let fc = file::parse_config(
            "[voice]\nvoice_id = \"es-ES-Fake-Q\"\nspeaking_rate = 9.0\npitch = 3.0",
        )
        .unwrap();
        let config = Config::from_sources(fc, env_of(&[])).unwrap();

        assert_eq!(config.voice.voice_id(), "es-ES-Neural2-A");
        assert!((config.voice.speaking_rate() - 4.0).abs() < f32::EPSILON);
        assert!((config.voice.pitch() - 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn data_dir_override() {
        let config = Config::from_sources(
            ClerkConfigFile::default(),
            env_of(&[("CLERK_DATA_DIR", "/tmp/clerk-test")]),
        )
        .unwrap();
        assert_eq!(config.turns_db_path(), PathBuf::from("/tmp/clerk-test/turns.db"));
    }
}

//! TOML configuration file loading
//!
//! Supports `~/.config/clerk-voice/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ClerkConfigFile {
    /// Turn pipeline settings
    #[serde(default)]
    pub pipeline: PipelineFileConfig,

    /// Clerk voice and prosody
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Speech-to-text backend
    #[serde(default)]
    pub stt: ProviderFileConfig,

    /// Reply backend
    #[serde(default)]
    pub reply: ProviderFileConfig,

    /// Text-to-speech backend
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Console key bindings
    #[serde(default)]
    pub activation: ActivationFileConfig,

    /// HTTP server
    #[serde(default)]
    pub server: ServerFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PipelineFileConfig {
    /// Target language code (e.g. "es-ES")
    pub language: Option<String>,

    /// Extra recognizer languages (e.g. `["es-MX", "es-US"]`)
    pub alternative_languages: Option<Vec<String>>,

    /// Recordings shorter than this are rejected
    pub min_recording_secs: Option<f64>,

    /// Capture sample rate in Hz
    pub sample_rate: Option<u32>,

    /// Seconds before a cloud backend request is abandoned
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct VoiceFileConfig {
    /// Catalog voice id (e.g. "es-ES-Neural2-A")
    pub voice_id: Option<String>,
    pub speaking_rate: Option<f32>,
    pub pitch: Option<f32>,
    pub volume_gain_db: Option<f32>,
}

/// Backend choice shared by `[stt]` and `[reply]`
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ProviderFileConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TtsFileConfig {
    pub provider: Option<String>,
    pub model: Option<String>,

    /// Voice name for backends with their own voice set (e.g. `OpenAI` "nova")
    pub voice: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ActivationFileConfig {
    /// Line that toggles recording (empty = Enter)
    pub key: Option<String>,

    /// Line that cancels and exits
    pub cancel_key: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ApiKeysFileConfig {
    pub google: Option<String>,
    pub gemini: Option<String>,
    pub openai: Option<String>,
}

/// Parse config file content
///
/// # Errors
///
/// Returns error if the content is not valid TOML for this schema
pub fn parse_config(content: &str) -> crate::Result<ClerkConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file from the standard path
///
/// Returns `ClerkConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ClerkConfigFile {
    let Some(path) = config_file_path() else {
        return ClerkConfigFile::default();
    };

    if !path.exists() {
        return ClerkConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ClerkConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ClerkConfigFile::default()
        }
    }
}

/// Return the config file path
///
/// `CLERK_CONFIG` overrides the default `~/.config/clerk-voice/config.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CLERK_CONFIG") {
        return Some(PathBuf::from(path));
    }

    directories::BaseDirs::new().map(|d| d.config_dir().join("clerk-voice").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_parses() {
        let config = parse_config(
            r#"
            [pipeline]
            language = "es-MX"
            min_recording_secs = 0.25

            [voice]
            voice_id = "es-ES-Wavenet-B"
            speaking_rate = 0.9

            [reply]
            provider = "offline"

            [api_keys]
            google = "from-file"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.language.as_deref(), Some("es-MX"));
        assert_eq!(config.pipeline.min_recording_secs, Some(0.25));
        assert_eq!(config.voice.voice_id.as_deref(), Some("es-ES-Wavenet-B"));
        assert_eq!(config.reply.provider.as_deref(), Some("offline"));
        assert_eq!(config.api_keys.google.as_deref(), Some("from-file"));
        assert!(config.stt.provider.is_none());
        assert!(config.server.port.is_none());
    }

    #[test]
    fn empty_file_is_default() {
        let config = parse_config("").unwrap();
        assert!(config.pipeline.language.is_none());
        assert!(config.api_keys.gemini.is_none());
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert!(parse_config("[server]\nport = \"eighty\"").is_err());
    }
}

//! Interactive setup wizard (`clerk setup`)
//!
//! Picks backends, the clerk's voice and prosody, and any API keys the chosen
//! backends need, then writes the TOML config file.

use std::path::{Path, PathBuf};

use dialoguer::{Input, Select};

use crate::config::file::{
    ApiKeysFileConfig, ClerkConfigFile, ProviderFileConfig, TtsFileConfig, VoiceFileConfig,
};
use crate::voice::{
    DEFAULT_VOICE_ID, PITCH_RANGE, SPEAKING_RATE_RANGE, VOICE_CATALOG, VOLUME_GAIN_RANGE,
};

const STT_PROVIDERS: [&str; 3] = ["google", "whisper", "offline"];
const REPLY_PROVIDERS: [&str; 2] = ["gemini", "offline"];
const TTS_PROVIDERS: [&str; 3] = ["google", "openai", "offline"];

/// Run the interactive setup wizard
///
/// # Errors
///
/// Returns error if user input fails or config cannot be written
pub fn run_setup() -> anyhow::Result<()> {
    println!("Clerk Voice Setup\n");

    let existing = crate::config::file::load_config_file();
    let config_path = crate::config::file::config_file_path()
        .unwrap_or_else(|| PathBuf::from("clerk-voice.toml"));

    if config_path.exists() {
        println!("Existing config found at {}\n", config_path.display());
    }

    // 1. Backends
    let stt = select_provider("Speech-to-text backend", &STT_PROVIDERS, existing.stt.provider.as_deref())?;
    let reply = select_provider("Reply backend", &REPLY_PROVIDERS, existing.reply.provider.as_deref())?;
    let tts = select_provider("Text-to-speech backend", &TTS_PROVIDERS, existing.tts.provider.as_deref())?;

    // 2. Voice
    let labels: Vec<String> = VOICE_CATALOG
        .iter()
        .map(|v| format!("{} ({})", v.id, v.description))
        .collect();
    let current_voice = existing.voice.voice_id.as_deref().unwrap_or(DEFAULT_VOICE_ID);
    let voice_idx = Select::new()
        .with_prompt("Clerk voice")
        .items(&labels)
        .default(VOICE_CATALOG.iter().position(|v| v.id == current_voice).unwrap_or(0))
        .interact()?;

    let speaking_rate = input_in_range(
        "Speaking rate",
        existing.voice.speaking_rate.unwrap_or(1.0),
        SPEAKING_RATE_RANGE,
    )?;
    let pitch = input_in_range("Pitch (semitones)", existing.voice.pitch.unwrap_or(0.0), PITCH_RANGE)?;
    let volume_gain_db = input_in_range(
        "Volume gain (dB)",
        existing.voice.volume_gain_db.unwrap_or(0.0),
        VOLUME_GAIN_RANGE,
    )?;

    // 3. API keys, only for the backends in use
    let mut api_keys = ApiKeysFileConfig::default();
    if stt == "google" || tts == "google" || reply == "gemini" {
        api_keys.google = prompt_key("Google Cloud", "GOOGLE_API_KEY", existing.api_keys.google)?;
    }
    if reply == "gemini" {
        println!("Leave the Gemini key blank to reuse the Google key.");
        api_keys.gemini = prompt_key("Gemini", "GEMINI_API_KEY", existing.api_keys.gemini)?;
    }
    if stt == "whisper" || tts == "openai" {
        api_keys.openai = prompt_key("OpenAI", "OPENAI_API_KEY", existing.api_keys.openai)?;
    }

    // 4. Build and write config
    let config_file = ClerkConfigFile {
        pipeline: existing.pipeline,
        voice: VoiceFileConfig {
            voice_id: Some(VOICE_CATALOG[voice_idx].id.to_string()),
            speaking_rate: Some(speaking_rate),
            pitch: Some(pitch),
            volume_gain_db: Some(volume_gain_db),
        },
        stt: ProviderFileConfig {
            provider: Some(stt.to_string()),
            model: existing.stt.model,
        },
        reply: ProviderFileConfig {
            provider: Some(reply.to_string()),
            model: existing.reply.model,
        },
        tts: TtsFileConfig {
            provider: Some(tts.to_string()),
            ..existing.tts
        },
        activation: existing.activation,
        server: existing.server,
        api_keys,
    };

    write_config(&config_path, &config_file)?;
    println!("\nConfig written to {}", config_path.display());
    println!("\nSetup complete! Run `clerk` to start talking to the clerk.");

    Ok(())
}

fn select_provider<'a>(
    prompt: &str,
    options: &[&'a str],
    current: Option<&str>,
) -> anyhow::Result<&'a str> {
    let idx = Select::new()
        .with_prompt(prompt)
        .items(options)
        .default(position_of(options, current))
        .interact()?;
    Ok(options[idx])
}

/// Index of `current` in `options`, case-insensitively, or 0
fn position_of(options: &[&str], current: Option<&str>) -> usize {
    current
        .and_then(|c| options.iter().position(|o| o.eq_ignore_ascii_case(c)))
        .unwrap_or(0)
}

fn input_in_range(prompt: &str, default: f32, (min, max): (f32, f32)) -> anyhow::Result<f32> {
    let value: f32 = Input::new()
        .with_prompt(format!("{prompt} [{min}..{max}]"))
        .default(default.clamp(min, max))
        .validate_with(move |v: &f32| {
            if (min..=max).contains(v) {
                Ok(())
            } else {
                Err(format!("must be between {min} and {max}"))
            }
        })
        .interact_text()?;
    Ok(value)
}

/// Ask for a key, keeping the existing one on blank input
fn prompt_key(label: &str, env_hint: &str, existing: Option<String>) -> anyhow::Result<Option<String>> {
    let prompt = match existing.as_deref() {
        Some(k) => format!("{label} API key (current: {}, leave blank to keep)", mask_key(k)),
        None => format!("{label} API key ({env_hint}, leave blank to use the environment)"),
    };

    let input: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;

    let input = input.trim();
    Ok(if input.is_empty() {
        existing
    } else {
        Some(input.to_string())
    })
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}

/// Serialize and write the config file
fn write_config(path: &Path, config: &ClerkConfigFile) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, toml::to_string_pretty(config)?)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::file::parse_config;

    #[test]
    fn masks_long_keys_only() {
        assert_eq!(mask_key("abcd1234efgh"), "abcd...efgh");
        assert_eq!(mask_key("short"), "****");
    }

    #[test]
    fn provider_position() {
        assert_eq!(position_of(&TTS_PROVIDERS, Some("OpenAI")), 1);
        assert_eq!(position_of(&TTS_PROVIDERS, Some("elevenlabs")), 0);
        assert_eq!(position_of(&TTS_PROVIDERS, None), 0);
    }

    #[test]
    fn written_config_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = ClerkConfigFile {
            voice: VoiceFileConfig {
                voice_id: Some("es-ES-Wavenet-B".to_string()),
                speaking_rate: Some(0.75),
                pitch: Some(-2.0),
                volume_gain_db: None,
            },
            reply: ProviderFileConfig {
                provider: Some("offline".to_string()),
                model: None,
            },
            ..ClerkConfigFile::default()
        };
        write_config(&path, &config).unwrap();

        let parsed = parse_config(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.voice.voice_id.as_deref(), Some("es-ES-Wavenet-B"));
        assert_eq!(parsed.voice.speaking_rate, Some(0.75));
        assert_eq!(parsed.voice.pitch, Some(-2.0));
        assert!(parsed.voice.volume_gain_db.is_none());
        assert_eq!(parsed.reply.provider.as_deref(), Some("offline"));
        assert!(parsed.api_keys.google.is_none());
    }
}

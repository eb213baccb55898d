//! Port construction from configuration

use std::sync::Arc;

use crate::config::{Config, ReplyProvider, SttProvider, TtsProvider};
use crate::db::{self, TurnRepo};
use crate::dialogue::DialogueLog;
use crate::pipeline::InteractionPipeline;
use crate::voice::{
    AudioCapturePort, AudioPlaybackPort, CpalCapture, CpalPlayback, DEFAULT_OFFLINE_PHRASE,
    GeminiReplyGenerator, GoogleSpeechToText, GoogleTextToSpeech, LanguageGate,
    OfflineReplyGenerator, OfflineSynthesizer, OfflineTranscriber, OpenAiTextToSpeech,
    ReplyGenerationPort, SpeechSynthesisPort, TranscriptionPort, WhisperSpeechToText,
};
use crate::Result;

/// Build the configured speech-to-text port
///
/// # Errors
///
/// Returns a configuration error if the backend's key is missing
pub fn build_transcriber(config: &Config) -> Result<Arc<dyn TranscriptionPort>> {
    let min_bytes = config.min_audio_bytes();
    let rate = config.pipeline.sample_rate;
    let timeout = config.pipeline.request_timeout;

    let port: Arc<dyn TranscriptionPort> = match config.stt.provider {
        SttProvider::Google => Arc::new(
            GoogleSpeechToText::new(config.google_key()?, config.stt.model.clone(), rate, min_bytes)?
                .alternative_languages(config.pipeline.alternative_languages.clone())
                .request_timeout(timeout),
        ),
        SttProvider::Whisper => Arc::new(
            WhisperSpeechToText::new(config.openai_key()?, config.stt.model.clone(), rate, min_bytes)?
                .request_timeout(timeout),
        ),
        SttProvider::Offline => Arc::new(OfflineTranscriber::new(DEFAULT_OFFLINE_PHRASE, min_bytes)),
    };

    tracing::debug!(provider = %config.stt.provider, "transcriber ready");
    Ok(port)
}

/// Build the configured reply port
///
/// # Errors
///
/// Returns a configuration error if the backend's key is missing
pub fn build_replier(config: &Config) -> Result<Arc<dyn ReplyGenerationPort>> {
    let port: Arc<dyn ReplyGenerationPort> = match config.reply.provider {
        ReplyProvider::Gemini => Arc::new(
            GeminiReplyGenerator::new(config.gemini_key()?, config.reply.model.clone())?
                .request_timeout(config.pipeline.request_timeout),
        ),
        ReplyProvider::Offline => Arc::new(OfflineReplyGenerator),
    };

    tracing::debug!(provider = %config.reply.provider, "reply generator ready");
    Ok(port)
}

/// Build the configured text-to-speech port
///
/// # Errors
///
/// Returns a configuration error if the backend's key is missing
pub fn build_synthesizer(config: &Config) -> Result<Arc<dyn SpeechSynthesisPort>> {
    let timeout = config.pipeline.request_timeout;
    let port: Arc<dyn SpeechSynthesisPort> = match config.tts.provider {
        TtsProvider::Google => {
            Arc::new(GoogleTextToSpeech::new(config.google_key()?)?.request_timeout(timeout))
        }
        TtsProvider::OpenAi => Arc::new(
            OpenAiTextToSpeech::new(
                config.openai_key()?,
                config.tts.openai_voice.clone(),
                config.tts.model.clone(),
            )?
            .request_timeout(timeout),
        ),
        TtsProvider::Offline => Arc::new(OfflineSynthesizer),
    };

    tracing::debug!(provider = %config.tts.provider, "synthesizer ready");
    Ok(port)
}

/// Speakers, if any
///
/// A missing output device is not fatal; replies are still returned as text.
pub fn build_playback() -> Option<Arc<dyn AudioPlaybackPort>> {
    match CpalPlayback::new() {
        Ok(playback) => Some(Arc::new(playback)),
        Err(e) => {
            tracing::warn!(error = %e, "no audio output, replies will be text only");
            None
        }
    }
}

/// Microphone at the configured rate
///
/// # Errors
///
/// Returns error if no input device is usable
pub fn build_capture(config: &Config) -> Result<Box<dyn AudioCapturePort>> {
    Ok(Box::new(CpalCapture::new(config.pipeline.sample_rate)?))
}

/// SQLite turn log under the data directory
///
/// # Errors
///
/// Returns error if the database cannot be opened
pub fn build_log(config: &Config) -> Result<Arc<dyn DialogueLog>> {
    let pool = db::init(config.turns_db_path())?;
    Ok(Arc::new(TurnRepo::new(pool)))
}

/// Assemble the full pipeline
///
/// # Errors
///
/// Returns the first configuration or storage error
pub fn build_pipeline(
    config: &Config,
    playback: Option<Arc<dyn AudioPlaybackPort>>,
) -> Result<InteractionPipeline> {
    config.validate()?;

    let mut builder = InteractionPipeline::builder()
        .transcriber(build_transcriber(config)?)
        .replier(build_replier(config)?)
        .synthesizer(build_synthesizer(config)?)
        .log(build_log(config)?)
        .gate(LanguageGate::spanish())
        .language(config.pipeline.language.clone())
        .min_audio_bytes(config.min_audio_bytes())
        .voice(config.voice.clone());

    if let Some(playback) = playback {
        builder = builder.playback(playback);
    }

    tracing::info!(
        stt = %config.stt.provider,
        reply = %config.reply.provider,
        tts = %config.tts.provider,
        language = %config.pipeline.language,
        "pipeline configured"
    );

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClerkConfigFile;

    fn config(env: &[(&str, &str)]) -> Config {
        let env: Vec<(String, String)> = env
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_sources(ClerkConfigFile::default(), move |key| {
            env.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    #[test]
    fn offline_ports_need_no_keys() {
        let config = config(&[]).offline();
        assert_eq!(build_transcriber(&config).unwrap().name(), "offline");
        assert_eq!(build_replier(&config).unwrap().name(), "offline");
        assert_eq!(build_synthesizer(&config).unwrap().name(), "offline");
    }

    #[test]
    fn cloud_ports_require_keys() {
        let config = config(&[]);
        assert!(matches!(build_transcriber(&config), Err(crate::Error::Config(_))));
        assert!(matches!(build_replier(&config), Err(crate::Error::Config(_))));
        assert!(matches!(build_synthesizer(&config), Err(crate::Error::Config(_))));
    }

    #[test]
    fn keyed_cloud_ports_build() {
        let config = config(&[("GOOGLE_API_KEY", "g"), ("CLERK_TTS_PROVIDER", "openai"), ("OPENAI_API_KEY", "o")]);
        assert_eq!(build_transcriber(&config).unwrap().name(), "google");
        assert_eq!(build_replier(&config).unwrap().name(), "gemini");
        assert_eq!(build_synthesizer(&config).unwrap().name(), "openai");
    }

    #[test]
    fn pipeline_uses_data_dir_log() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_string_lossy().to_string();
        let config = config(&[("CLERK_DATA_DIR", data_dir.as_str())]).offline();

        let pipeline = build_pipeline(&config, None).unwrap();
        assert_eq!(pipeline.min_audio_bytes(), 16000);
        assert!(config.turns_db_path().exists());
    }
}

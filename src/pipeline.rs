//! Interaction pipeline
//!
//! One turn: length check, transcription, language gate, reply, speech,
//! log. Every path ends in a [`TurnOutcome`]; nothing inside a turn is fatal.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::dialogue::{DialogueLog, DialogueTurn, MemoryDialogueLog};
use crate::voice::{
    AudioPlaybackPort, LanguageGate, ReplyGenerationPort, SAMPLE_RATE, SpeechSynthesisPort,
    TranscriptionError, TranscriptionPort, VoiceSettings, min_audio_bytes,
};
use crate::{Error, Result};

/// Spoken when the recording is below the minimum duration
pub const TOO_SHORT_MESSAGE: &str =
    "Audio muy corto. Por favor, mantén presionado el botón mientras hablas.";

/// Spoken when nothing intelligible was transcribed
pub const NOT_UNDERSTOOD_MESSAGE: &str =
    "No pude entenderte bien. ¿Puedes repetir más claro por favor?";

/// Spoken when the customer did not speak the target language
pub const WRONG_LANGUAGE_MESSAGE: &str =
    "Por favor, habla en español. Estoy aquí para ayudarte a practicar.";

/// Spoken when a turn dies for reasons outside the customer's control
pub const TECHNICAL_MESSAGE: &str = "Lo siento, hubo un problema técnico.";

/// Opening line
pub const GREETING_MESSAGE: &str =
    "¡Hola! Bienvenido a nuestra tienda. ¿En qué puedo ayudarte hoy?";

/// Default minimum recording duration in seconds
pub const DEFAULT_MIN_RECORDING_SECS: f64 = 0.5;

/// Audio captured between two activations
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub raw_audio: Vec<u8>,
    pub sample_rate: u32,
}

impl RecordingSession {
    #[must_use]
    pub fn new(started_at: DateTime<Utc>, raw_audio: Vec<u8>, sample_rate: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at,
            raw_audio,
            sample_rate,
        }
    }

    /// Length of the recording, from its byte count
    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        crate::voice::audio::pcm_duration_secs(&self.raw_audio, self.sample_rate)
    }
}

/// Why the customer is being asked to try again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuidanceReason {
    TooShort,
    NotUnderstood,
    WrongLanguage,
}

impl GuidanceReason {
    /// Spoken guidance sentence
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::TooShort => TOO_SHORT_MESSAGE,
            Self::NotUnderstood => NOT_UNDERSTOOD_MESSAGE,
            Self::WrongLanguage => WRONG_LANGUAGE_MESSAGE,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TooShort => "too_short",
            Self::NotUnderstood => "not_understood",
            Self::WrongLanguage => "wrong_language",
        }
    }
}

/// Result of one turn
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The clerk answered
    Reply {
        turn: DialogueTurn,
        audio: Option<Vec<u8>>,
    },
    /// The customer should try again
    Guidance {
        reason: GuidanceReason,
        message: String,
        transcript: Option<String>,
        audio: Option<Vec<u8>>,
    },
    /// Technical failure
    Failed {
        message: String,
        detail: String,
        audio: Option<Vec<u8>>,
    },
}

impl TurnOutcome {
    /// Failure with the generic technical message and no audio
    #[must_use]
    pub fn technical(detail: impl Into<String>) -> Self {
        Self::Failed {
            message: TECHNICAL_MESSAGE.to_string(),
            detail: detail.into(),
            audio: None,
        }
    }

    /// Short tag for logs and the HTTP surface
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Reply { .. } => "reply",
            Self::Guidance { .. } => "guidance",
            Self::Failed { .. } => "failed",
        }
    }

    /// Text the clerk says
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Reply { turn, .. } => &turn.npc_reply_text,
            Self::Guidance { message, .. } | Self::Failed { message, .. } => message,
        }
    }

    /// What the customer was heard saying, if anything
    #[must_use]
    pub fn transcript(&self) -> Option<&str> {
        match self {
            Self::Reply { turn, .. } => Some(&turn.user_text),
            Self::Guidance { transcript, .. } => transcript.as_deref(),
            Self::Failed { .. } => None,
        }
    }

    /// Synthesized speech for [`Self::text`]
    #[must_use]
    pub fn audio(&self) -> Option<&[u8]> {
        match self {
            Self::Reply { audio, .. } | Self::Guidance { audio, .. } | Self::Failed { audio, .. } => {
                audio.as_deref()
            }
        }
    }

    #[must_use]
    pub const fn guidance_reason(&self) -> Option<GuidanceReason> {
        match self {
            Self::Guidance { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Runs turns against injected ports
pub struct InteractionPipeline {
    transcriber: Arc<dyn TranscriptionPort>,
    replier: Arc<dyn ReplyGenerationPort>,
    synthesizer: Arc<dyn SpeechSynthesisPort>,
    playback: Option<Arc<dyn AudioPlaybackPort>>,
    log: Arc<dyn DialogueLog>,
    gate: LanguageGate,
    language: String,
    min_audio_bytes: usize,
    voice: VoiceSettings,
}

impl InteractionPipeline {
    /// Start building a pipeline
    #[must_use]
    pub fn builder() -> InteractionPipelineBuilder {
        InteractionPipelineBuilder::default()
    }

    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    #[must_use]
    pub const fn min_audio_bytes(&self) -> usize {
        self.min_audio_bytes
    }

    #[must_use]
    pub const fn voice(&self) -> &VoiceSettings {
        &self.voice
    }

    /// Shared turn log
    #[must_use]
    pub fn log(&self) -> Arc<dyn DialogueLog> {
        Arc::clone(&self.log)
    }

    /// Process one recording
    pub async fn run_turn(&self, session: RecordingSession) -> TurnOutcome {
        let bytes = session.raw_audio.len();
        tracing::info!(
            session_id = %session.id,
            bytes,
            duration_secs = session.duration_seconds(),
            "processing recording"
        );

        if bytes < self.min_audio_bytes {
            tracing::info!(bytes, min_bytes = self.min_audio_bytes, "recording too short");
            return self.guidance(GuidanceReason::TooShort, None).await;
        }

        let transcript = match self
            .transcriber
            .transcribe(&session.raw_audio, &self.language)
            .await
        {
            Ok(text) => text,
            Err(TranscriptionError::Backend(detail)) => {
                tracing::error!(backend = self.transcriber.name(), error = %detail, "transcription failed");
                let audio = self.speak(NOT_UNDERSTOOD_MESSAGE).await;
                return TurnOutcome::Failed {
                    message: NOT_UNDERSTOOD_MESSAGE.to_string(),
                    detail,
                    audio,
                };
            }
            Err(e) => {
                tracing::info!(error = %e, "nothing understood");
                return self.guidance(GuidanceReason::NotUnderstood, None).await;
            }
        };

        self.respond_to(transcript).await
    }

    /// Process typed input, skipping capture and transcription
    pub async fn run_text_turn(&self, text: &str) -> TurnOutcome {
        self.respond_to(text.to_string()).await
    }

    /// Speak the opening greeting
    pub async fn greet(&self) -> Option<Vec<u8>> {
        tracing::info!(npc = GREETING_MESSAGE, "greeting");
        self.speak(GREETING_MESSAGE).await
    }

    async fn respond_to(&self, transcript: String) -> TurnOutcome {
        let transcript = transcript.trim().to_string();
        if transcript.is_empty() {
            return self.guidance(GuidanceReason::NotUnderstood, None).await;
        }

        if !self.gate.is_target_language(&transcript) {
            tracing::info!(transcript = %transcript, language = self.gate.language_code(), "wrong language");
            return self
                .guidance(GuidanceReason::WrongLanguage, Some(transcript))
                .await;
        }

        let reply = self.replier.generate_reply(&transcript, &self.language).await;
        let audio = self.speak(&reply).await;

        let turn = DialogueTurn::new(transcript, reply);
        tracing::info!(user = %turn.user_text, npc = %turn.npc_reply_text, "interaction complete");

        if let Err(e) = self.log.record(&turn) {
            tracing::warn!(error = %e, "failed to record dialogue turn");
        }

        TurnOutcome::Reply { turn, audio }
    }

    async fn guidance(&self, reason: GuidanceReason, transcript: Option<String>) -> TurnOutcome {
        let message = reason.message();
        let audio = self.speak(message).await;
        TurnOutcome::Guidance {
            reason,
            message: message.to_string(),
            transcript,
            audio,
        }
    }

    /// Synthesize and play `text`; either step may fail without ending the turn
    async fn speak(&self, text: &str) -> Option<Vec<u8>> {
        let audio = match self.synthesizer.synthesize(text, &self.voice).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(backend = self.synthesizer.name(), error = %e, "speech synthesis failed");
                return None;
            }
        };

        if let Some(playback) = &self.playback
            && let Err(e) = playback.play(&audio).await
        {
            tracing::warn!(error = %e, "playback failed");
        }

        Some(audio)
    }
}

/// Builder for [`InteractionPipeline`]
#[derive(Default)]
pub struct InteractionPipelineBuilder {
    transcriber: Option<Arc<dyn TranscriptionPort>>,
    replier: Option<Arc<dyn ReplyGenerationPort>>,
    synthesizer: Option<Arc<dyn SpeechSynthesisPort>>,
    playback: Option<Arc<dyn AudioPlaybackPort>>,
    log: Option<Arc<dyn DialogueLog>>,
    gate: Option<LanguageGate>,
    language: Option<String>,
    min_audio_bytes: Option<usize>,
    voice: Option<VoiceSettings>,
}

impl InteractionPipelineBuilder {
    #[must_use]
    pub fn transcriber(mut self, port: Arc<dyn TranscriptionPort>) -> Self {
        self.transcriber = Some(port);
        self
    }

    #[must_use]
    pub fn replier(mut self, port: Arc<dyn ReplyGenerationPort>) -> Self {
        self.replier = Some(port);
        self
    }

    #[must_use]
    pub fn synthesizer(mut self, port: Arc<dyn SpeechSynthesisPort>) -> Self {
        self.synthesizer = Some(port);
        self
    }

    /// Play synthesized speech locally; without it audio is only returned
    #[must_use]
    pub fn playback(mut self, port: Arc<dyn AudioPlaybackPort>) -> Self {
        self.playback = Some(port);
        self
    }

    #[must_use]
    pub fn log(mut self, log: Arc<dyn DialogueLog>) -> Self {
        self.log = Some(log);
        self
    }

    #[must_use]
    pub fn gate(mut self, gate: LanguageGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Language hint for transcription and reply (default `es-ES`)
    #[must_use]
    pub fn language(mut self, code: impl Into<String>) -> Self {
        self.language = Some(code.into());
        self
    }

    #[must_use]
    pub const fn min_audio_bytes(mut self, bytes: usize) -> Self {
        self.min_audio_bytes = Some(bytes);
        self
    }

    #[must_use]
    pub fn voice(mut self, voice: VoiceSettings) -> Self {
        self.voice = Some(voice);
        self
    }

    /// Build the pipeline
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a transcription, reply or synthesis
    /// port is missing
    pub fn build(self) -> Result<InteractionPipeline> {
        let missing = |what: &str| Error::Config(format!("pipeline requires a {what} port"));

        let gate = self.gate.unwrap_or_default();
        let language = self
            .language
            .unwrap_or_else(|| gate.language_code().to_string());

        Ok(InteractionPipeline {
            transcriber: self.transcriber.ok_or_else(|| missing("transcription"))?,
            replier: self.replier.ok_or_else(|| missing("reply"))?,
            synthesizer: self.synthesizer.ok_or_else(|| missing("synthesis"))?,
            playback: self.playback,
            log: self
                .log
                .unwrap_or_else(|| Arc::new(MemoryDialogueLog::new())),
            gate,
            language,
            min_audio_bytes: self
                .min_audio_bytes
                .unwrap_or_else(|| min_audio_bytes(SAMPLE_RATE, DEFAULT_MIN_RECORDING_SECS)),
            voice: self.voice.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::{OfflineReplyGenerator, OfflineSynthesizer, OfflineTranscriber};

    #[test]
    fn session_duration_from_bytes() {
        let session = RecordingSession::new(Utc::now(), vec![0; 48000], 16000);
        assert!((session.duration_seconds() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn builder_requires_ports() {
        let result = InteractionPipeline::builder()
            .replier(Arc::new(OfflineReplyGenerator))
            .synthesizer(Arc::new(OfflineSynthesizer))
            .build();
        assert!(matches!(result, Err(Error::Config(m)) if m.contains("transcription")));
    }

    #[test]
    fn builder_defaults() {
        let pipeline = InteractionPipeline::builder()
            .transcriber(Arc::new(OfflineTranscriber::new("hola", 0)))
            .replier(Arc::new(OfflineReplyGenerator))
            .synthesizer(Arc::new(OfflineSynthesizer))
            .build()
            .unwrap();

        assert_eq!(pipeline.language(), "es-ES");
        assert_eq!(pipeline.min_audio_bytes(), 16000);
    }

    #[test]
    fn outcome_accessors() {
        let outcome = TurnOutcome::technical("task panicked");
        assert_eq!(outcome.kind(), "failed");
        assert_eq!(outcome.text(), TECHNICAL_MESSAGE);
        assert!(outcome.audio().is_none());
        assert!(outcome.transcript().is_none());

        assert_eq!(GuidanceReason::WrongLanguage.message(), WRONG_LANGUAGE_MESSAGE);
        assert_eq!(GuidanceReason::TooShort.as_str(), "too_short");
    }
}

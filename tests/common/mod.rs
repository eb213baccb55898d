//! Shared test utilities
//!
//! Scripted port implementations with call counters. Nothing here touches the
//! network or audio hardware.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use clerk_voice::voice::{
    AudioCapturePort, AudioPlaybackPort, CaptureError, OfflineSynthesizer, PlaybackError,
    ReplyGenerationPort, SpeechSynthesisPort, SynthesisError, TranscriptionError,
    TranscriptionPort, VoiceSettings,
};
use clerk_voice::{InteractionPipeline, MemoryDialogueLog};

/// One second of PCM16 silence at 16 kHz
pub const ONE_SECOND_PCM: usize = 32000;

/// Transcriber returning a fixed result
///
/// With a gate set, each call waits for one `notify_one` before returning.
pub struct ScriptedTranscriber {
    result: Result<String, TranscriptionError>,
    pub calls: Arc<AtomicUsize>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedTranscriber {
    pub fn hears(text: &str) -> Self {
        Self::returning(Ok(text.to_string()))
    }

    pub fn returning(result: Result<String, TranscriptionError>) -> Self {
        Self {
            result,
            calls: Arc::new(AtomicUsize::new(0)),
            gate: None,
        }
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl TranscriptionPort for ScriptedTranscriber {
    async fn transcribe(&self, _audio: &[u8], _language_hint: &str) -> Result<String, TranscriptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.result.clone()
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Reply generator returning a fixed answer
pub struct ScriptedReplier {
    reply: String,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedReplier {
    pub fn says(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ReplyGenerationPort for ScriptedReplier {
    async fn generate_reply(&self, _user_text: &str, _language: &str) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Synthesizer that always fails
pub struct FailingSynthesizer;

#[async_trait]
impl SpeechSynthesisPort for FailingSynthesizer {
    async fn synthesize(&self, _text: &str, _voice: &VoiceSettings) -> Result<Vec<u8>, SynthesisError> {
        Err(SynthesisError::Backend("synthesis offline".to_string()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Playback that records what it was asked to play
#[derive(Default)]
pub struct CountingPlayback {
    pub calls: Arc<AtomicUsize>,
    pub last: Arc<Mutex<Option<Vec<u8>>>>,
}

#[async_trait]
impl AudioPlaybackPort for CountingPlayback {
    async fn play(&self, audio: &[u8]) -> Result<(), PlaybackError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(audio.to_vec());
        Ok(())
    }
}

/// Playback whose device is always gone
#[derive(Default)]
pub struct FailingPlayback {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl AudioPlaybackPort for FailingPlayback {
    async fn play(&self, _audio: &[u8]) -> Result<(), PlaybackError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(PlaybackError::DeviceUnavailable("speaker unplugged".to_string()))
    }
}

/// Accepts connections and never answers; returns its base URL
pub async fn silent_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{addr}")
}

/// Counters shared with a [`MockCapture`] after it is boxed
#[derive(Clone, Default)]
pub struct CaptureCounters {
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    pub releases: Arc<AtomicUsize>,
}

impl CaptureCounters {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

/// Capture device yielding a fixed buffer on every stop
pub struct MockCapture {
    pcm: Vec<u8>,
    recording: bool,
    fail_start: bool,
    fail_stop: bool,
    counters: CaptureCounters,
}

impl MockCapture {
    pub fn yielding(pcm: Vec<u8>) -> (Self, CaptureCounters) {
        let counters = CaptureCounters::default();
        let capture = Self {
            pcm,
            recording: false,
            fail_start: false,
            fail_stop: false,
            counters: counters.clone(),
        };
        (capture, counters)
    }

    pub fn unavailable() -> (Self, CaptureCounters) {
        let (mut capture, counters) = Self::yielding(Vec::new());
        capture.fail_start = true;
        (capture, counters)
    }

    /// Starts, but loses the device on the first stop
    pub fn failing_stop(pcm: Vec<u8>) -> (Self, CaptureCounters) {
        let (mut capture, counters) = Self::yielding(pcm);
        capture.fail_stop = true;
        (capture, counters)
    }
}

#[async_trait]
impl AudioCapturePort for MockCapture {
    async fn start(&mut self) -> Result<(), CaptureError> {
        if self.fail_start {
            return Err(CaptureError::DeviceUnavailable("no microphone".to_string()));
        }
        if self.recording {
            return Err(CaptureError::AlreadyRecording);
        }
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        self.recording = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<Vec<u8>, CaptureError> {
        if !self.recording {
            return Err(CaptureError::NotRecording);
        }
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        self.recording = false;
        if self.fail_stop {
            self.fail_stop = false;
            return Err(CaptureError::DeviceUnavailable("microphone unplugged".to_string()));
        }
        Ok(self.pcm.clone())
    }

    fn release(&mut self) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        self.recording = false;
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn sample_rate(&self) -> u32 {
        16000
    }
}

/// Pipeline with offline synthesis feeding the given playback
pub fn pipeline_playing(
    transcriber: Arc<dyn TranscriptionPort>,
    synthesizer: Arc<dyn SpeechSynthesisPort>,
    playback: Arc<dyn AudioPlaybackPort>,
) -> (Arc<InteractionPipeline>, Arc<MemoryDialogueLog>) {
    let log = Arc::new(MemoryDialogueLog::new());
    let pipeline = InteractionPipeline::builder()
        .transcriber(transcriber)
        .replier(Arc::new(ScriptedReplier::says("Las manzanas están en la sección de frutas.")))
        .synthesizer(synthesizer)
        .playback(playback)
        .log(log.clone())
        .build()
        .expect("pipeline should build");
    (Arc::new(pipeline), log)
}

/// Pipeline over the given ports with offline synthesis and an inspectable log
pub fn pipeline_with(
    transcriber: Arc<dyn TranscriptionPort>,
    replier: Arc<dyn ReplyGenerationPort>,
) -> (Arc<InteractionPipeline>, Arc<MemoryDialogueLog>) {
    let log = Arc::new(MemoryDialogueLog::new());
    let pipeline = InteractionPipeline::builder()
        .transcriber(transcriber)
        .replier(replier)
        .synthesizer(Arc::new(OfflineSynthesizer))
        .log(log.clone())
        .build()
        .expect("pipeline should build");
    (Arc::new(pipeline), log)
}

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use clerk_voice::api::ApiServerBuilder;
use clerk_voice::backends;
use clerk_voice::console::{ConsoleBindings, render_outcome, run_console};
use clerk_voice::dialogue::DialogueLog;
use clerk_voice::voice::audio::{pcm_duration_secs, pcm16_to_samples, pcm16_to_wav, sine_tone};
use clerk_voice::voice::{
    AudioCapturePort, AudioPlaybackPort, CpalCapture, CpalPlayback, SpeechSynthesisPort,
    VOICE_CATALOG, samples_to_pcm16,
};
use clerk_voice::Config;

/// Clerk - talk to a grocery clerk in Spanish
#[derive(Parser)]
#[command(name = "clerk", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Use offline backends (no network, no API keys)
    #[arg(long, env = "CLERK_OFFLINE")]
    offline: bool,

    /// Don't play replies through the speakers
    #[arg(long, env = "CLERK_NO_AUDIO")]
    no_audio: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP turn API
    Serve {
        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one text-only turn
    Say {
        /// What the customer says
        text: String,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "3")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output with the configured voice
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hola, bienvenido a la tienda.")]
        text: String,
    },
    /// List available clerk voices
    Voices,
    /// Show recent dialogue turns
    Turns {
        /// Number of turns to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Interactive voice and backend setup
    Setup,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,clerk_voice=info",
        1 => "info,clerk_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(cmd) = cli.command else {
        return console(&load_config(cli.offline)?, cli.no_audio).await;
    };

    match cmd {
        // Runs before config loading so a broken file can be rewritten
        Command::Setup => clerk_voice::setup::run_setup(),
        Command::Serve { port } => serve(&load_config(cli.offline)?, port).await,
        Command::Say { text } => say(&load_config(cli.offline)?, cli.no_audio, &text).await,
        Command::TestMic { duration } => test_mic(&load_config(cli.offline)?, duration).await,
        Command::TestSpeaker => test_speaker().await,
        Command::TestTts { text } => {
            test_tts(&load_config(cli.offline)?, cli.no_audio, &text).await
        }
        Command::Voices => {
            list_voices(&load_config(cli.offline)?);
            Ok(())
        }
        Command::Turns { limit } => list_turns(&load_config(cli.offline)?, limit),
    }
}

fn load_config(offline: bool) -> anyhow::Result<Config> {
    let mut config = Config::load()?;
    if offline {
        config = config.offline();
    }
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

fn playback(no_audio: bool) -> Option<Arc<dyn AudioPlaybackPort>> {
    if no_audio { None } else { backends::build_playback() }
}

/// Push-to-talk console
async fn console(config: &Config, no_audio: bool) -> anyhow::Result<()> {
    let pipeline = Arc::new(backends::build_pipeline(config, playback(no_audio))?);
    let capture = backends::build_capture(config)?;

    tracing::info!(language = pipeline.language(), "clerk ready");
    run_console(pipeline, capture, ConsoleBindings::from_config(&config.activation)).await;

    Ok(())
}

/// HTTP API; audio goes back in responses, never to local speakers
async fn serve(config: &Config, port: Option<u16>) -> anyhow::Result<()> {
    let pipeline = Arc::new(backends::build_pipeline(config, None)?);
    let port = port.unwrap_or(config.server.port);

    ApiServerBuilder::new(pipeline, port)
        .sample_rate(config.pipeline.sample_rate)
        .build()
        .run()
        .await?;

    Ok(())
}

/// One text turn
async fn say(config: &Config, no_audio: bool, text: &str) -> anyhow::Result<()> {
    let pipeline = backends::build_pipeline(config, playback(no_audio))?;
    let outcome = pipeline.run_text_turn(text).await;

    for line in render_outcome(&outcome) {
        println!("{line}");
    }

    Ok(())
}

/// Test microphone input
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = CpalCapture::new(config.pipeline.sample_rate)?;
    capture.start().await?;
    tokio::time::sleep(Duration::from_secs(duration)).await;
    let pcm = capture.stop().await?;

    let samples = pcm16_to_samples(&pcm);
    let energy = calculate_rms(&samples);
    let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

    println!("Sample rate: {} Hz", capture.sample_rate());
    println!(
        "Captured {:.2}s ({} bytes) | RMS: {energy:.4} | Peak: {peak:.4}",
        pcm_duration_secs(&pcm, capture.sample_rate()),
        pcm.len()
    );
    println!("Minimum for a turn: {} bytes", config.min_audio_bytes());

    println!("\n---");
    println!("If RMS is well above 0, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = 24000;
    let samples = sine_tone(440.0, 2.0, 0.3, sample_rate);
    let wav = pcm16_to_wav(&samples_to_pcm16(&samples), sample_rate)?;

    println!("Playing {} samples at {sample_rate} Hz...", samples.len());
    CpalPlayback::new()?.play(&wav).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Test TTS output with the configured backend and voice
async fn test_tts(config: &Config, no_audio: bool, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let synthesizer = backends::build_synthesizer(config)?;
    println!(
        "Synthesizing with {} ({}, rate {}, pitch {}, gain {} dB)...",
        synthesizer.name(),
        config.voice.voice_id(),
        config.voice.speaking_rate(),
        config.voice.pitch(),
        config.voice.volume_gain_db()
    );

    let audio = synthesizer.synthesize(text, &config.voice).await?;
    println!("Got {} bytes of audio data", audio.len());

    if !no_audio {
        println!("Playing audio...");
        CpalPlayback::new()?.play(&audio).await?;
        println!("\n---");
        println!("If you heard the speech, TTS is working!");
    }

    Ok(())
}

fn list_voices(config: &Config) {
    for voice in VOICE_CATALOG {
        let marker = if voice.id == config.voice.voice_id() { "*" } else { " " };
        println!("{marker} {:<20} {:?}\t{}", voice.id, voice.gender, voice.description);
    }
}

fn list_turns(config: &Config, limit: usize) -> anyhow::Result<()> {
    let log = backends::build_log(config)?;
    let turns = log.recent(limit)?;

    if turns.is_empty() {
        println!("No turns recorded yet");
        return Ok(());
    }

    for turn in turns.iter().rev() {
        println!("[{}]", turn.timestamp.format("%Y-%m-%d %H:%M:%S"));
        println!("  Tú: {}", turn.user_text);
        println!("  Dependiente: {}", turn.npc_reply_text);
    }

    Ok(())
}

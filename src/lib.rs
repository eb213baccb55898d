//! Clerk Voice - a voice-driven grocery clerk for Spanish practice
//!
//! The customer talks, the clerk listens, checks the customer is speaking
//! Spanish, answers in character and speaks the answer back.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Surfaces                          │
//! │        Console (push-to-talk)  │  HTTP API           │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │   RecordingController  →  InteractionPipeline        │
//! │   capture │ STT │ language gate │ reply │ TTS │ play │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │   Backends: Google STT/TTS │ Whisper │ Gemini │ offline │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod backends;
pub mod config;
pub mod console;
pub mod controller;
pub mod db;
pub mod dialogue;
pub mod error;
pub mod pipeline;
pub mod prompt;
pub mod setup;
pub mod voice;

pub use config::Config;
pub use controller::{Activation, ControlEvent, PipelineState, RecordingController};
pub use db::{DbConn, DbPool, TurnRepo};
pub use dialogue::{DialogueLog, DialogueTurn, MemoryDialogueLog};
pub use error::{Error, Result};
pub use pipeline::{
    GuidanceReason, InteractionPipeline, InteractionPipelineBuilder, RecordingSession, TurnOutcome,
};
pub use prompt::ClerkPersona;

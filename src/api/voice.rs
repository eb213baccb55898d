//! Voice turn endpoints

use std::sync::Arc;

use axum::{Json, Router, body::Bytes, extract::State, routing::post};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState};
use crate::pipeline::{GuidanceReason, RecordingSession, TurnOutcome};
use crate::voice::audio::{is_wav, pcm16_to_samples, resample, samples_to_pcm16, wav_to_pcm16};

/// Build voice router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/turn", post(audio_turn))
        .route("/text", post(text_turn))
        .with_state(state)
}

/// Outcome of one turn
#[derive(Debug, Serialize)]
pub struct TurnResponse {
    /// `reply`, `guidance` or `failed`
    pub kind: &'static str,
    /// What the clerk said
    pub text: String,
    pub transcript: Option<String>,
    pub reason: Option<GuidanceReason>,
    /// Base64 speech for `text`
    pub audio: Option<String>,
}

impl From<&TurnOutcome> for TurnResponse {
    fn from(outcome: &TurnOutcome) -> Self {
        Self {
            kind: outcome.kind(),
            text: outcome.text().to_string(),
            transcript: outcome.transcript().map(str::to_string),
            reason: outcome.guidance_reason(),
            audio: outcome.audio().map(|a| BASE64.encode(a)),
        }
    }
}

/// Text turn request
#[derive(Debug, Deserialize)]
pub struct TextTurnRequest {
    pub text: String,
}

/// Run a turn on uploaded audio
///
/// Accepts a 16-bit WAV file or raw mono PCM16 at the server's sample rate.
async fn audio_turn(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<TurnResponse>, ApiError> {
    let _guard = state.turn_lock.try_lock().map_err(|_| ApiError::Busy)?;

    let pcm = if is_wav(&body) {
        let decoded = wav_to_pcm16(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        if decoded.sample_rate == state.sample_rate {
            decoded.pcm
        } else {
            tracing::debug!(from = decoded.sample_rate, to = state.sample_rate, "resampling upload");
            let samples = pcm16_to_samples(&decoded.pcm);
            let resampled = resample(&samples, decoded.sample_rate, state.sample_rate)
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            samples_to_pcm16(&resampled)
        }
    } else {
        body.to_vec()
    };

    let session = RecordingSession::new(Utc::now(), pcm, state.sample_rate);
    let outcome = state.pipeline.run_turn(session).await;

    Ok(Json(TurnResponse::from(&outcome)))
}

/// Run a turn on typed text
async fn text_turn(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<TextTurnRequest>,
) -> Result<Json<TurnResponse>, ApiError> {
    if request.text.trim().is_empty() {
        return Err(ApiError::BadRequest("empty text".to_string()));
    }

    let _guard = state.turn_lock.try_lock().map_err(|_| ApiError::Busy)?;
    let outcome = state.pipeline.run_text_turn(&request.text).await;

    Ok(Json(TurnResponse::from(&outcome)))
}

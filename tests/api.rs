//! API endpoint integration tests

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use clerk_voice::api::{ApiState, router};
use clerk_voice::voice::pcm16_to_wav;
use tower::ServiceExt;

mod common;
use common::{ONE_SECOND_PCM, ScriptedReplier, ScriptedTranscriber, pipeline_with};

const APPLES: &str = "Hola, ¿dónde están las manzanas?";
const APPLES_REPLY: &str = "Las manzanas están en la sección de frutas.";

/// Build a test API state over scripted ports
fn build_test_state() -> Arc<ApiState> {
    let (pipeline, _log) = pipeline_with(
        Arc::new(ScriptedTranscriber::hears(APPLES)),
        Arc::new(ScriptedReplier::says(APPLES_REPLY)),
    );
    Arc::new(ApiState::new(pipeline, 16000))
}

fn post_audio(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/voice/turn")
        .header(header::CONTENT_TYPE, "audio/wav")
        .body(Body::from(body))
        .unwrap()
}

fn post_text(text: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/voice/text")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::json!({ "text": text }).to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = router(build_test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_wav_turn_returns_reply() {
    let app = router(build_test_state());
    let wav = pcm16_to_wav(&vec![0; ONE_SECOND_PCM], 16000).unwrap();

    let response = app.oneshot(post_audio(wav)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["kind"], "reply");
    assert_eq!(json["text"], APPLES_REPLY);
    assert_eq!(json["transcript"], APPLES);
    assert!(json["reason"].is_null());
    assert!(json["audio"].is_string());
}

#[tokio::test]
async fn test_wav_at_other_rate_is_resampled() {
    let app = router(build_test_state());
    // One second at 8 kHz, long enough once brought up to 16 kHz
    let wav = pcm16_to_wav(&vec![0; 16000], 8000).unwrap();

    let response = app.oneshot(post_audio(wav)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["kind"], "reply");
}

#[tokio::test]
async fn test_short_raw_pcm_gets_guidance() {
    let app = router(build_test_state());

    let response = app.oneshot(post_audio(vec![0; 100])).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["kind"], "guidance");
    assert_eq!(json["reason"], "too_short");
    assert!(json["transcript"].is_null());
}

#[tokio::test]
async fn test_undecodable_wav_is_bad_request() {
    let app = router(build_test_state());
    let mut body = b"RIFF\0\0\0\0WAVE".to_vec();
    body.extend_from_slice(b"not really a wav file");

    let response = app.oneshot(post_audio(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_concurrent_turn_is_conflict() {
    let state = build_test_state();
    let app = router(Arc::clone(&state));
    let _running = state.turn_lock.lock().await;

    let response = app.oneshot(post_text(APPLES)).await.unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["error"]["code"], "busy");
}

#[tokio::test]
async fn test_text_turn_and_history() {
    let state = build_test_state();

    let response = router(Arc::clone(&state))
        .oneshot(post_text(APPLES))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["text"], APPLES_REPLY);

    let response = router(state)
        .oneshot(
            Request::builder()
                .uri("/api/turns?limit=5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    let turns = json["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0]["user_text"], APPLES);
    assert_eq!(turns[0]["npc_reply_text"], APPLES_REPLY);
}

#[tokio::test]
async fn test_empty_text_is_bad_request() {
    let app = router(build_test_state());

    let response = app.oneshot(post_text("  ")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

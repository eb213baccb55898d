//! HTTP API server
//!
//! Exposes the interaction pipeline to remote front ends: one turn per
//! request, single-flight across all requests.

pub mod health;
pub mod turns;
pub mod voice;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::dialogue::DialogueLog;
use crate::pipeline::InteractionPipeline;
use crate::voice::SAMPLE_RATE;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<InteractionPipeline>,

    /// Held for the duration of a turn
    pub turn_lock: Arc<Mutex<()>>,

    pub log: Arc<dyn DialogueLog>,

    /// Rate assumed for raw PCM bodies and targeted for WAV bodies
    pub sample_rate: u32,
}

impl ApiState {
    #[must_use]
    pub fn new(pipeline: Arc<InteractionPipeline>, sample_rate: u32) -> Self {
        let log = pipeline.log();
        Self {
            pipeline,
            turn_lock: Arc::new(Mutex::new(())),
            log,
            sample_rate,
        }
    }
}

/// API errors rendered as `{error: {code, message}}`
#[derive(Debug)]
pub enum ApiError {
    /// A turn is already running
    Busy,
    BadRequest(String),
    Storage(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code, message) = match self {
            Self::Busy => (
                StatusCode::CONFLICT,
                "busy",
                "a turn is already in progress".to_string(),
            ),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Storage(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_failed", msg),
        };

        (status, Json(ErrorResponse { error: ErrorBody { code, message } })).into_response()
    }
}

/// Build the router with all routes
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api/voice", voice::router(Arc::clone(&state)))
        .nest("/api/turns", turns::router(state))
        .merge(health::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Builder for [`ApiServer`]
pub struct ApiServerBuilder {
    pipeline: Arc<InteractionPipeline>,
    port: u16,
    sample_rate: u32,
}

impl ApiServerBuilder {
    #[must_use]
    pub const fn new(pipeline: Arc<InteractionPipeline>, port: u16) -> Self {
        Self {
            pipeline,
            port,
            sample_rate: SAMPLE_RATE,
        }
    }

    #[must_use]
    pub const fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    #[must_use]
    pub fn build(self) -> ApiServer {
        ApiServer {
            state: Arc::new(ApiState::new(self.pipeline, self.sample_rate)),
            port: self.port,
        }
    }
}

/// HTTP API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Router over this server's state
    #[must_use]
    pub fn router(&self) -> Router {
        router(Arc::clone(&self.state))
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutting down API server");
            })
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

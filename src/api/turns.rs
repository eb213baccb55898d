//! Dialogue history endpoint

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState};
use crate::dialogue::DialogueTurn;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 200;

/// Build turns router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new().route("/", get(list_turns)).with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct TurnsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TurnsResponse {
    pub turns: Vec<DialogueTurn>,
}

/// Recent turns, newest first
async fn list_turns(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<TurnsQuery>,
) -> Result<Json<TurnsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let turns = state
        .log
        .recent(limit)
        .map_err(|e| ApiError::Storage(e.to_string()))?;

    Ok(Json(TurnsResponse { turns }))
}

//! Vote submission and ledger snapshot.

use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiErrorBody};
use crate::votes::VoteDelta;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/vote", post(vote))
        .route("/votes", get(snapshot))
}

// ---------------------------------------------------------------------------
// POST /api/vote
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct VoteRequest {
    pub track_id: String,
    /// `1` or `-1`.
    pub vote: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VoteResponse {
    pub success: bool,
    pub votes: i64,
}

#[utoipa::path(
    post,
    path = "/api/vote",
    tag = "Votes",
    request_body = VoteRequest,
    responses(
        (status = 200, description = "Vote applied", body = VoteResponse),
        (status = 400, description = "Malformed vote", body = ApiErrorBody),
    ),
)]
pub async fn vote(
    State(state): State<AppState>,
    body: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<VoteResponse>, ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    let track_id = body.track_id.as_str();
    if track_id.trim().is_empty() {
        return Err(ApiError::bad_request("track_id is required"));
    }
    let delta = VoteDelta::try_from(body.vote)?;

    let votes = state.ledger.apply_vote(track_id, delta).await;
    tracing::debug!(%track_id, vote = body.vote, votes, "vote applied");

    Ok(Json(VoteResponse {
        success: true,
        votes,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/votes
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/votes",
    tag = "Votes",
    responses(
        (status = 200, description = "Every item's current count, keyed by item id"),
    ),
)]
pub async fn snapshot(State(state): State<AppState>) -> Json<HashMap<String, i64>> {
    Json(state.ledger.read_all())
}

//! Playlist reads, enriched with live vote counts.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::auth::middleware::AuthSession;
use crate::error::{ApiError, ApiErrorBody};
use crate::provider::Track;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/playlists", get(list_playlists))
        .route("/playlist/{playlist_id}/tracks", get(playlist_tracks))
}

// ---------------------------------------------------------------------------
// GET /api/playlists
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/playlists",
    tag = "Playlists",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "The user's playlists as returned by the provider"),
        (status = 401, description = "Not authenticated", body = ApiErrorBody),
        (status = 502, description = "Provider request failed", body = ApiErrorBody),
    ),
)]
pub async fn list_playlists(
    session: AuthSession,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let playlists = state
        .provider
        .playlists(&session.record.access_token)
        .await?;
    Ok(Json(playlists))
}

// ---------------------------------------------------------------------------
// GET /api/playlist/:playlist_id/tracks
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/playlist/{playlist_id}/tracks",
    tag = "Playlists",
    security(("bearer" = [])),
    params(("playlist_id" = String, Path, description = "Provider playlist ID")),
    responses(
        (status = 200, description = "Tracks sorted by votes, highest first", body = Vec<Track>),
        (status = 401, description = "Not authenticated", body = ApiErrorBody),
        (status = 502, description = "Provider request failed", body = ApiErrorBody),
    ),
)]
pub async fn playlist_tracks(
    session: AuthSession,
    State(state): State<AppState>,
    Path(playlist_id): Path<String>,
) -> Result<Json<Vec<Track>>, ApiError> {
    let tracks = state
        .provider
        .playlist_tracks(&session.record.access_token, &playlist_id)
        .await?;

    let counts = state.ledger.read_all();
    Ok(Json(rank_by_votes(tracks, &counts)))
}

/// Attach current counts and order by votes, highest first. Ties keep the
/// playlist order.
pub(crate) fn rank_by_votes(mut tracks: Vec<Track>, counts: &HashMap<String, i64>) -> Vec<Track> {
    for track in &mut tracks {
        track.votes = counts.get(&track.id).copied().unwrap_or(0);
    }
    tracks.sort_by(|a, b| b.votes.cmp(&a.votes));
    tracks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> Track {
        Track {
            id: id.into(),
            name: id.to_uppercase(),
            artists: String::new(),
            album: String::new(),
            image_url: String::new(),
            uri: format!("spotify:track:{id}"),
            votes: 0,
        }
    }

    #[test]
    fn ranking_is_stable_for_ties() {
        let tracks = vec![track("a"), track("b"), track("c"), track("d")];
        let counts = HashMap::from([
            ("c".to_string(), 3),
            ("d".to_string(), -1),
            ("x".to_string(), 9),
        ]);

        let ranked = rank_by_votes(tracks, &counts);
        let order: Vec<_> = ranked.iter().map(|t| (t.id.as_str(), t.votes)).collect();
        assert_eq!(order, vec![("c", 3), ("a", 0), ("b", 0), ("d", -1)]);
    }
}

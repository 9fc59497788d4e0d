pub mod auth;
pub mod health;
pub mod playlists;
pub mod votes;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(crate::gateway::server::router())
        .nest("/api", votes::router().merge(playlists::router()))
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Auth
        auth::login,
        auth::callback,
        auth::logout,
        auth::auth_status,
        // Votes
        votes::vote,
        votes::snapshot,
        // Playlists
        playlists::list_playlists,
        playlists::playlist_tracks,
    ),
    components(
        schemas(
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::provider::Track,
            health::HealthResponse,
            auth::AuthStatus,
            votes::VoteRequest,
            votes::VoteResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Auth", description = "Provider login and sessions"),
        (name = "Votes", description = "Voting and the live ledger"),
        (name = "Playlists", description = "Playlists enriched with votes"),
    )
)]
pub struct ApiDoc;

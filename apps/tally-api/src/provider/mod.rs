//! Boundary to the third-party content provider.
//!
//! The core only needs two things from it: token grants (authorization and
//! renewal) and opaque item ids. Everything else here is request-handler glue.

pub mod spotify;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

pub use spotify::SpotifyClient;

/// Errors talking to the provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid provider url: {0}")]
    InvalidUrl(String),

    #[error("no refresh token on record")]
    MissingRefreshToken,

    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
}

/// An access token bundle as handed out by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Renewals may omit this, in which case the previous one stays valid.
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// A playlist entry enriched with its current vote count.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artists: String,
    pub album: String,
    pub image_url: String,
    pub uri: String,
    pub votes: i64,
}

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait TokenRenewer: Send + Sync {
    async fn renew(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError>;
}

/// The parts of the provider API that request handlers call.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// URL the browser is redirected to in order to start authorization.
    fn authorize_url(&self, state: &str) -> Result<String, ProviderError>;

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError>;

    async fn current_user_id(&self, access_token: &str) -> Result<String, ProviderError>;

    /// The user's playlists, passed through as the provider returns them.
    async fn playlists(&self, access_token: &str) -> Result<serde_json::Value, ProviderError>;

    /// Every track of a playlist, with `votes` left at zero.
    async fn playlist_tracks(
        &self,
        access_token: &str,
        playlist_id: &str,
    ) -> Result<Vec<Track>, ProviderError>;
}

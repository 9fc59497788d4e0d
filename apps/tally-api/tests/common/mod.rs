#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use chrono::{Duration, Utc};
use parking_lot::Mutex;

use tally_api::config::{Config, Intervals, DEFAULT_SUBSCRIBER_BUFFER};
use tally_api::db::kv::{KeyValueStore, MemoryStore};
use tally_api::db::store::InMemoryStore;
use tally_api::provider::{ContentProvider, ProviderError, TokenGrant, TokenRenewer, Track};
use tally_api::sessions::CredentialRecord;
use tally_api::{AppState, Backends, Running};

pub const AUTHORIZE_URL: &str = "https://provider.test/authorize";

/// Stand-in for the content provider. Every call is answered from memory.
#[derive(Default)]
pub struct FakeProvider {
    pub user_id: Mutex<String>,
    pub tracks: Mutex<Vec<Track>>,
    pub failing: Mutex<bool>,
    pub exchanged_codes: Mutex<Vec<String>>,
    pub renewals: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        let provider = Self::default();
        *provider.user_id.lock() = "user-1".to_string();
        provider
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn set_tracks(&self, tracks: Vec<Track>) {
        *self.tracks.lock() = tracks;
    }

    fn check(&self) -> Result<(), ProviderError> {
        if *self.failing.lock() {
            return Err(ProviderError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContentProvider for FakeProvider {
    fn authorize_url(&self, state: &str) -> Result<String, ProviderError> {
        Ok(format!("{AUTHORIZE_URL}?state={state}"))
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError> {
        self.check()?;
        self.exchanged_codes.lock().push(code.to_string());
        Ok(TokenGrant {
            access_token: format!("access-{code}"),
            refresh_token: Some(format!("refresh-{code}")),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    async fn current_user_id(&self, _access_token: &str) -> Result<String, ProviderError> {
        self.check()?;
        Ok(self.user_id.lock().clone())
    }

    async fn playlists(&self, _access_token: &str) -> Result<serde_json::Value, ProviderError> {
        self.check()?;
        Ok(serde_json::json!({
            "items": [{ "id": "pl1", "name": "Party" }],
            "total": 1
        }))
    }

    async fn playlist_tracks(
        &self,
        _access_token: &str,
        _playlist_id: &str,
    ) -> Result<Vec<Track>, ProviderError> {
        self.check()?;
        Ok(self.tracks.lock().clone())
    }
}

#[async_trait]
impl TokenRenewer for FakeProvider {
    async fn renew(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError> {
        self.check()?;
        self.renewals.lock().push(refresh_token.to_string());
        Ok(TokenGrant {
            access_token: format!("renewed-{refresh_token}"),
            refresh_token: None,
            expires_at: Utc::now() + Duration::hours(1),
        })
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/tally_test".into(),
        provider_client_id: "client-id".into(),
        provider_client_secret: "client-secret".into(),
        redirect_url: "http://localhost:8080/callback".into(),
        port: 0,
        intervals: Intervals::default(),
        subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
    }
}

pub struct TestApp {
    pub running: Running,
    pub store: Arc<InMemoryStore>,
    pub provider: Arc<FakeProvider>,
}

impl TestApp {
    pub fn state(&self) -> AppState {
        self.running.state.clone()
    }

    pub fn router(&self) -> Router {
        tally_api::routes::router().with_state(self.state())
    }

    /// Register a session directly, skipping the OAuth round trip.
    pub async fn login(&self, session_id: &str) -> Arc<CredentialRecord> {
        let record = CredentialRecord {
            session_id: session_id.to_string(),
            user_id: self.provider.user_id.lock().clone(),
            access_token: format!("access-{session_id}"),
            refresh_token: Some(format!("refresh-{session_id}")),
            expiry: Utc::now() + Duration::hours(1),
            last_refresh: Utc::now(),
        };
        self.running.state.sessions.put(record).await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.running.shutdown();
    }
}

/// Build the app over in-memory backends.
pub async fn test_app() -> TestApp {
    test_app_with_store(Arc::new(InMemoryStore::new())).await
}

/// Build the app over a pre-populated store (to exercise hydration).
pub async fn test_app_with_store(store: Arc<InMemoryStore>) -> TestApp {
    let provider = Arc::new(FakeProvider::new());
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let content: Arc<dyn ContentProvider> = provider.clone();
    let renewer: Arc<dyn TokenRenewer> = provider.clone();

    let running = tally_api::start(
        test_config(),
        Backends {
            store: store.clone(),
            kv,
            provider: content,
            renewer,
        },
    )
    .await;

    TestApp {
        running,
        store,
        provider,
    }
}

pub fn track(id: &str) -> Track {
    Track {
        id: id.to_string(),
        name: format!("Song {id}"),
        artists: "Artist".into(),
        album: "Album".into(),
        image_url: String::new(),
        uri: format!("spotify:track:{id}"),
        votes: 0,
    }
}

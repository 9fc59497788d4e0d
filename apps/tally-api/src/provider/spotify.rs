//! Spotify Web API client: OAuth authorization-code flow, token renewal and
//! the two playlist reads the voting UI needs.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;

use super::{ContentProvider, ProviderError, TokenGrant, TokenRenewer, Track};

const ACCOUNTS_URL: &str = "https://accounts.spotify.com";
const API_URL: &str = "https://api.spotify.com/v1";

/// Scopes requested at login.
const SCOPES: &[&str] = &[
    "user-read-private",
    "user-read-email",
    "playlist-read-private",
    "playlist-modify-public",
    "playlist-modify-private",
    "user-modify-playback-state",
    "user-read-playback-state",
    "streaming",
];

const PLAYLIST_PAGE_SIZE: usize = 100;
const PLAYLIST_LIST_LIMIT: usize = 50;

#[derive(Clone)]
pub struct SpotifyClient {
    client_id: String,
    client_secret: String,
    redirect_url: String,
    accounts_url: String,
    api_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn into_grant(self) -> Result<TokenGrant, ProviderError> {
        let expires_at = Duration::try_seconds(self.expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                ProviderError::InvalidResponse(format!("expires_in out of range: {}", self.expires_in))
            })?;
        Ok(TokenGrant {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            expires_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CurrentUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistPage {
    #[serde(default)]
    items: Vec<PlaylistItem>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<PlaylistTrack>,
}

#[derive(Debug, Deserialize)]
struct PlaylistTrack {
    /// Local files have no id.
    id: Option<String>,
    name: String,
    uri: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    artists: Vec<Named>,
    album: Option<Album>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Album {
    name: String,
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
}

impl SpotifyClient {
    pub fn new(client_id: &str, client_secret: &str, redirect_url: &str) -> Self {
        Self::with_base_urls(client_id, client_secret, redirect_url, ACCOUNTS_URL, API_URL)
    }

    /// Point the client at a different accounts/API origin (e.g. a mock server).
    pub fn with_base_urls(
        client_id: &str,
        client_secret: &str,
        redirect_url: &str,
        accounts_url: &str,
        api_url: &str,
    ) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_url: redirect_url.to_string(),
            accounts_url: accounts_url.trim_end_matches('/').to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenGrant, ProviderError> {
        let resp = self
            .http
            .post(format!("{}/api/token", self.accounts_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await?;
        let token: TokenResponse = check(resp).await?.json().await?;
        token.into_grant()
    }

    /// API url for `segments`, each percent-encoded as a single path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, ProviderError> {
        if let Some(bad) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
            return Err(ProviderError::InvalidUrl(format!("bad path segment {bad:?}")));
        }
        let mut url = reqwest::Url::parse(&self.api_url)
            .map_err(|e| ProviderError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| ProviderError::InvalidUrl(self.api_url.clone()))?
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        access_token: &str,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let resp = self
            .http
            .get(self.endpoint(segments)?)
            .bearer_auth(access_token)
            .query(query)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }
}

/// Turn a non-2xx response into [`ProviderError::Status`] with its body.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Flatten one page of playlist items, skipping episodes, local files and
/// removed tracks.
fn tracks_from_page(page: PlaylistPage) -> Vec<Track> {
    page.items
        .into_iter()
        .filter_map(|item| item.track)
        .filter(|t| t.kind.as_deref().map_or(true, |k| k == "track"))
        .filter_map(|t| {
            let id = t.id?;
            let artists = t
                .artists
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let (album, image_url) = match t.album {
                Some(album) => {
                    let image = album.images.into_iter().next().map(|i| i.url);
                    (album.name, image.unwrap_or_default())
                }
                None => (String::new(), String::new()),
            };
            Some(Track {
                id,
                name: t.name,
                artists,
                album,
                image_url,
                uri: t.uri,
                votes: 0,
            })
        })
        .collect()
}

#[async_trait]
impl TokenRenewer for SpotifyClient {
    async fn renew(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}

#[async_trait]
impl ContentProvider for SpotifyClient {
    fn authorize_url(&self, state: &str) -> Result<String, ProviderError> {
        let scope = SCOPES.join(" ");
        let url = reqwest::Url::parse_with_params(
            &format!("{}/authorize", self.accounts_url),
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.redirect_url.as_str()),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| ProviderError::InvalidUrl(e.to_string()))?;
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_url.as_str()),
        ])
        .await
    }

    async fn current_user_id(&self, access_token: &str) -> Result<String, ProviderError> {
        let user: CurrentUser = self.get_json(access_token, &["me"], &[]).await?;
        Ok(user.id)
    }

    async fn playlists(&self, access_token: &str) -> Result<serde_json::Value, ProviderError> {
        self.get_json(
            access_token,
            &["me", "playlists"],
            &[("limit", PLAYLIST_LIST_LIMIT.to_string())],
        )
        .await
    }

    async fn playlist_tracks(
        &self,
        access_token: &str,
        playlist_id: &str,
    ) -> Result<Vec<Track>, ProviderError> {
        let path = ["playlists", playlist_id, "tracks"];
        let mut tracks = Vec::new();
        let mut offset = 0;

        loop {
            let page: PlaylistPage = self
                .get_json(
                    access_token,
                    &path,
                    &[
                        ("limit", PLAYLIST_PAGE_SIZE.to_string()),
                        ("offset", offset.to_string()),
                    ],
                )
                .await?;
            let page_len = page.items.len();
            tracks.extend(tracks_from_page(page));

            if page_len < PLAYLIST_PAGE_SIZE {
                break;
            }
            offset += PLAYLIST_PAGE_SIZE;
        }

        Ok(tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_flattening_skips_non_tracks() {
        let page: PlaylistPage = serde_json::from_value(serde_json::json!({
            "items": [
                { "track": {
                    "id": "t1", "name": "One", "uri": "spotify:track:t1", "type": "track",
                    "artists": [{ "name": "A" }, { "name": "B" }],
                    "album": { "name": "Alb", "images": [{ "url": "big" }, { "url": "small" }] }
                }},
                { "track": null },
                { "track": {
                    "id": "e1", "name": "Ep", "uri": "spotify:episode:e1", "type": "episode",
                    "artists": []
                }},
                { "track": {
                    "id": null, "name": "Local", "uri": "spotify:local:x", "type": "track",
                    "artists": []
                }},
                { "track": {
                    "id": "t2", "name": "Two", "uri": "spotify:track:t2",
                    "artists": [{ "name": "C" }],
                    "album": { "name": "Bare", "images": [] }
                }}
            ]
        }))
        .unwrap();

        let tracks = tracks_from_page(page);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].id, "t1");
        assert_eq!(tracks[0].artists, "A, B");
        assert_eq!(tracks[0].image_url, "big");
        assert_eq!(tracks[1].album, "Bare");
        assert_eq!(tracks[1].image_url, "");
    }

    #[test]
    fn authorize_url_carries_state_and_scopes() {
        let client = SpotifyClient::new("cid", "secret", "http://localhost:8080/callback");
        let url = client.authorize_url("st_abc").unwrap();
        let parsed = reqwest::Url::parse(&url).unwrap();
        let params: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert!(url.starts_with("https://accounts.spotify.com/authorize?"));
        assert_eq!(params["client_id"], "cid");
        assert_eq!(params["state"], "st_abc");
        assert_eq!(params["redirect_uri"], "http://localhost:8080/callback");
        assert!(params["scope"].contains("playlist-read-private"));
    }

    #[test]
    fn empty_refresh_token_is_treated_as_absent() {
        let grant = TokenResponse {
            access_token: "at".into(),
            expires_in: 3600,
            refresh_token: Some(String::new()),
        }
        .into_grant()
        .unwrap();
        assert!(grant.refresh_token.is_none());
        assert!(grant.expires_at > Utc::now());
    }

    #[test]
    fn out_of_range_lifetime_is_an_error() {
        let result = TokenResponse {
            access_token: "at".into(),
            expires_in: i64::MAX,
            refresh_token: None,
        }
        .into_grant();
        assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
    }

    #[test]
    fn playlist_id_stays_inside_its_path_segment() {
        let client = SpotifyClient::new("cid", "secret", "http://localhost:8080/callback");

        let url = client.endpoint(&["playlists", "../me", "tracks"]).unwrap();
        assert_eq!(url.as_str(), "https://api.spotify.com/v1/playlists/..%2Fme/tracks");

        let url = client.endpoint(&["playlists", "a?b#c", "tracks"]).unwrap();
        assert_eq!(url.path(), "/v1/playlists/a%3Fb%23c/tracks");
        assert!(url.query().is_none());

        for bad in ["..", ".", ""] {
            assert!(matches!(
                client.endpoint(&["playlists", bad, "tracks"]),
                Err(ProviderError::InvalidUrl(_))
            ));
        }
    }
}

//! Session extraction from the `tally_session` cookie or a bearer header.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};

use crate::error::ApiError;
use crate::sessions::CredentialRecord;
use crate::AppState;

pub const SESSION_COOKIE: &str = "tally_session";

/// Cookie lifetime in seconds (30 days).
pub const SESSION_COOKIE_MAX_AGE: u64 = 30 * 24 * 3600;

/// A logged-in session resolved against the session registry.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub session_id: String,
    pub record: Arc<CredentialRecord>,
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session_id = session_id_from_headers(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;

        let record = state.sessions.get(&session_id).ok_or_else(|| {
            tracing::debug!(%session_id, "session not found");
            ApiError::unauthorized("Not authenticated")
        })?;

        Ok(AuthSession { session_id, record })
    }
}

/// The caller's session id, cookie first, then `Authorization: Bearer`.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    cookie_value(headers, SESSION_COOKIE).or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    })
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, v)| *k == name && !v.is_empty())
        .map(|(_, v)| v.to_string())
}

/// `Set-Cookie` value binding the browser to `session_id`.
pub fn session_cookie(session_id: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={SESSION_COOKIE_MAX_AGE}"
    ))
    .map_err(|_| ApiError::internal("invalid session id"))
}

/// `Set-Cookie` value that removes the session cookie.
pub fn cleared_session_cookie() -> HeaderValue {
    HeaderValue::from_static("tally_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(axum::http::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn cookie_is_found_among_others() {
        let h = headers(&[(COOKIE, "theme=dark; tally_session=ses_abc; other=1")]);
        assert_eq!(session_id_from_headers(&h).as_deref(), Some("ses_abc"));
    }

    #[test]
    fn cookie_wins_over_bearer() {
        let h = headers(&[
            (COOKIE, "tally_session=ses_cookie"),
            (AUTHORIZATION, "Bearer ses_bearer"),
        ]);
        assert_eq!(session_id_from_headers(&h).as_deref(), Some("ses_cookie"));
    }

    #[test]
    fn bearer_is_used_without_cookie() {
        let h = headers(&[(AUTHORIZATION, "Bearer ses_bearer")]);
        assert_eq!(session_id_from_headers(&h).as_deref(), Some("ses_bearer"));
    }

    #[test]
    fn empty_or_missing_yields_none() {
        assert!(session_id_from_headers(&HeaderMap::new()).is_none());
        let h = headers(&[(COOKIE, "tally_session="), (AUTHORIZATION, "Basic abc")]);
        assert!(session_id_from_headers(&h).is_none());
    }

    #[test]
    fn cookies_round_trip_through_header_values() {
        let set = session_cookie("ses_1").unwrap();
        let set = set.to_str().unwrap();
        assert!(set.starts_with("tally_session=ses_1;"));
        assert!(set.contains("HttpOnly"));
        assert!(cleared_session_cookie().to_str().unwrap().contains("Max-Age=0"));
    }
}

//! Auth routes: provider login, OAuth callback, logout and status.

use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::middleware::{cleared_session_cookie, session_cookie, session_id_from_headers};
use crate::auth::tokens;
use crate::error::{ApiError, ApiErrorBody};
use crate::provider::ContentProvider;
use crate::sessions::CredentialRecord;
use crate::AppState;

/// Attempts at reading the user profile right after the code exchange.
const USER_LOOKUP_ATTEMPTS: u32 = 3;
const USER_LOOKUP_BACKOFF: Duration = Duration::from_secs(2);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login))
        .route("/callback", get(callback))
        .route("/logout", get(logout))
        .route("/api/auth-status", get(auth_status))
}

// ---------------------------------------------------------------------------
// GET /login
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/login",
    tag = "Auth",
    responses(
        (status = 307, description = "Redirect to the provider's authorization page"),
    ),
)]
pub async fn login(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let session_id = tokens::generate_session_id();
    let oauth_state = tokens::generate_oauth_state();
    tokens::store_oauth_state(state.kv.as_ref(), &oauth_state, &session_id).await?;

    let url = state.provider.authorize_url(&oauth_state)?;
    tracing::info!(%session_id, "login started");

    Ok((
        [(SET_COOKIE, session_cookie(&session_id)?)],
        Redirect::temporary(&url),
    ))
}

// ---------------------------------------------------------------------------
// GET /callback
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[utoipa::path(
    get,
    path = "/callback",
    tag = "Auth",
    params(CallbackParams),
    responses(
        (status = 303, description = "Logged in; redirect to the app"),
        (status = 400, description = "Missing code or state", body = ApiErrorBody),
        (status = 401, description = "Unknown or expired state, or login started in another browser", body = ApiErrorBody),
        (status = 502, description = "Provider rejected the exchange", body = ApiErrorBody),
    ),
)]
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(error) = params.error {
        tracing::warn!(%error, "provider denied authorization");
        return Err(ApiError::unauthorized("Authorization was denied"));
    }
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing code"))?;
    let oauth_state = params
        .state
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing state"))?;

    let session_id = tokens::consume_oauth_state(state.kv.as_ref(), &oauth_state)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired state"))?;

    // The state is bound to the session that started the login. Only that
    // browser may complete it.
    if session_id_from_headers(&headers).as_deref() != Some(session_id.as_str()) {
        tracing::warn!(%session_id, "callback session does not match login session");
        return Err(ApiError::unauthorized("Login was started from another session"));
    }

    let grant = state.provider.exchange_code(&code).await.map_err(|err| {
        tracing::warn!(?err, %session_id, "code exchange failed");
        ApiError::from(err)
    })?;

    let user_id = lookup_user_id(state.provider.as_ref(), &grant.access_token).await?;

    let record = CredentialRecord::from_grant(&session_id, &user_id, grant, Utc::now());
    let record = state.sessions.put(record).await;
    tracing::info!(
        %session_id,
        %user_id,
        expiry = %record.expiry,
        "user logged in"
    );

    Ok((
        [(SET_COOKIE, session_cookie(&session_id)?)],
        Redirect::to("/"),
    ))
}

/// The profile endpoint occasionally fails right after a fresh grant.
async fn lookup_user_id(
    provider: &dyn ContentProvider,
    access_token: &str,
) -> Result<String, ApiError> {
    let mut attempt = 1;
    loop {
        match provider.current_user_id(access_token).await {
            Ok(id) => return Ok(id),
            Err(err) if attempt < USER_LOOKUP_ATTEMPTS => {
                tracing::warn!(?err, attempt, "failed to get current user; retrying");
                attempt += 1;
                tokio::time::sleep(USER_LOOKUP_BACKOFF).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// GET /logout
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/logout",
    tag = "Auth",
    responses((status = 303, description = "Session removed; redirect to the app")),
)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(session_id) = session_id_from_headers(&headers) {
        if let Some(record) = state.sessions.remove(&session_id).await {
            tracing::info!(%session_id, user_id = %record.user_id, "user logged out");
        }
    }
    ([(SET_COOKIE, cleared_session_cookie())], Redirect::to("/"))
}

// ---------------------------------------------------------------------------
// GET /api/auth-status
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthStatus {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/auth-status",
    tag = "Auth",
    responses((status = 200, description = "Whether the caller has a live session", body = AuthStatus)),
)]
pub async fn auth_status(State(state): State<AppState>, headers: HeaderMap) -> Json<AuthStatus> {
    let record = session_id_from_headers(&headers).and_then(|id| state.sessions.get(&id));
    Json(AuthStatus {
        authenticated: record.is_some(),
        user_id: record.map(|r| r.user_id.clone()),
    })
}

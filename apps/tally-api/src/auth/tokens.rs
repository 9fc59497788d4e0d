//! Session ids and single-use OAuth `state` values.

use tally_common::id::{PrefixedId, SessionId};

use crate::db::kv::KeyValueStore;
use crate::error::ApiError;

/// Generate an opaque random token with the given prefix.
pub fn generate_opaque_token(prefix: &str, bytes: usize) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use rand::Rng;
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(&mut buf[..]);
    format!("{}_{}", prefix, URL_SAFE_NO_PAD.encode(&buf))
}

/// A new, time-ordered session id (`ses_<ulid>`).
pub fn generate_session_id() -> String {
    SessionId::generate()
}

// ---------------------------------------------------------------------------
// OAuth state: 10-minute TTL, single-use
// ---------------------------------------------------------------------------

/// How long a login may take between `/login` and `/callback`.
pub const OAUTH_STATE_TTL_SECS: u64 = 10 * 60;

pub fn generate_oauth_state() -> String {
    generate_opaque_token("st", 24)
}

fn state_key(state: &str) -> String {
    format!("oauth:state:{}", state)
}

/// Remember which session started the login carrying `state`.
pub async fn store_oauth_state(
    kv: &dyn KeyValueStore,
    state: &str,
    session_id: &str,
) -> Result<(), ApiError> {
    kv.set_ex(&state_key(state), session_id, OAUTH_STATE_TTL_SECS)
        .await
}

/// Consume a `state` value, returning the session id it was issued for.
/// A second call with the same state returns `None`.
pub async fn consume_oauth_state(
    kv: &dyn KeyValueStore,
    state: &str,
) -> Result<Option<String>, ApiError> {
    kv.take(&state_key(state)).await
}

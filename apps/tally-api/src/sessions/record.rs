//! One logical login and its renewable access token.

use chrono::{DateTime, Utc};

use crate::db::store::PersistedSession;
use crate::provider::TokenGrant;

/// Where a credential sits relative to its refresh window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// Valid and outside the lookahead window.
    Active,
    /// Still valid but due for renewal on the next sweep.
    NearExpiry,
    /// Past expiry. Kept until logout; a sweep keeps trying to renew it.
    Expired,
}

/// A credential record. Held behind an `Arc` in the registry and never
/// mutated in place: renewal builds a new record and swaps the pointer, so a
/// reader always sees a token together with its own expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub session_id: String,
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: DateTime<Utc>,
    pub last_refresh: DateTime<Utc>,
}

impl CredentialRecord {
    /// A fresh record from a successful authorization.
    pub fn from_grant(session_id: &str, user_id: &str, grant: TokenGrant, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expiry: grant.expires_at,
            last_refresh: now,
        }
    }

    /// Rebuild a record loaded from the durable store.
    pub fn from_persisted(row: PersistedSession, now: DateTime<Utc>) -> Self {
        Self {
            session_id: row.session_id,
            user_id: row.user_id,
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            expiry: row.token_expiry,
            last_refresh: now,
        }
    }

    /// The record after a successful renewal. Identity fields are kept; the
    /// old refresh token survives if the provider did not rotate it.
    pub fn renewed(&self, grant: TokenGrant, now: DateTime<Utc>) -> Self {
        Self {
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or_else(|| self.refresh_token.clone()),
            expiry: grant.expires_at,
            last_refresh: now,
        }
    }

    pub fn to_persisted(&self) -> PersistedSession {
        PersistedSession {
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            token_expiry: self.expiry,
        }
    }

    pub fn state(&self, now: DateTime<Utc>, lookahead: chrono::Duration) -> CredentialState {
        if self.expiry <= now {
            CredentialState::Expired
        } else if self.expiry < now + lookahead {
            CredentialState::NearExpiry
        } else {
            CredentialState::Active
        }
    }

    pub fn needs_refresh(&self, now: DateTime<Utc>, lookahead: chrono::Duration) -> bool {
        self.state(now, lookahead) != CredentialState::Active
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn record(expiry: DateTime<Utc>) -> CredentialRecord {
        CredentialRecord {
            session_id: "ses_1".into(),
            user_id: "u1".into(),
            access_token: "old".into(),
            refresh_token: Some("rt".into()),
            expiry,
            last_refresh: expiry - Duration::hours(1),
        }
    }

    #[test]
    fn state_follows_lookahead_window() {
        let now = Utc::now();
        let window = Duration::minutes(5);
        assert_eq!(record(now + Duration::hours(1)).state(now, window), CredentialState::Active);
        assert_eq!(record(now + Duration::minutes(3)).state(now, window), CredentialState::NearExpiry);
        assert_eq!(record(now - Duration::minutes(1)).state(now, window), CredentialState::Expired);
        assert!(!record(now + Duration::minutes(5)).needs_refresh(now, window));
    }

    #[test]
    fn renewal_keeps_identity_and_unrotated_refresh_token() {
        let now = Utc::now();
        let old = record(now + Duration::minutes(3));
        let new = old.renewed(
            TokenGrant {
                access_token: "new".into(),
                refresh_token: None,
                expires_at: now + Duration::hours(1),
            },
            now,
        );
        assert_eq!(new.session_id, old.session_id);
        assert_eq!(new.user_id, old.user_id);
        assert_eq!(new.access_token, "new");
        assert_eq!(new.refresh_token.as_deref(), Some("rt"));
        assert_eq!(new.last_refresh, now);
    }

    #[test]
    fn renewal_adopts_rotated_refresh_token() {
        let now = Utc::now();
        let new = record(now).renewed(
            TokenGrant {
                access_token: "new".into(),
                refresh_token: Some("rt2".into()),
                expires_at: now + Duration::hours(1),
            },
            now,
        );
        assert_eq!(new.refresh_token.as_deref(), Some("rt2"));
    }
}

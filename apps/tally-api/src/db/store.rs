//! Durable mirror of the vote ledger and the session registry.
//!
//! The in-memory structures are authoritative. This store only ever receives
//! upserts/deletes after the fact and is read once at startup.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::DbPool;
use super::schema::{sessions, votes};
use crate::models::session::{NewSessionRow, SessionRow};
use crate::models::vote::{NewVote, VoteRow};

/// Errors raised by a [`DurableStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel_async::pooled_connection::deadpool::PoolError),

    #[error("query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("failed to connect: {0}")]
    Connect(String),

    /// Injected failure from [`InMemoryStore::set_failing`].
    #[error("store unavailable")]
    Unavailable,
}

/// A credential row as the store sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSession {
    pub session_id: String,
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expiry: DateTime<Utc>,
}

/// Key-value persistence for votes and session credentials.
///
/// Backed by PostgreSQL in production and an in-memory map in tests.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn upsert_vote(&self, item_id: &str, count: i64) -> Result<(), StoreError>;
    async fn load_votes(&self) -> Result<Vec<(String, i64)>, StoreError>;
    async fn upsert_session(&self, session: &PersistedSession) -> Result<(), StoreError>;
    async fn delete_session(&self, session_id: &str) -> Result<(), StoreError>;
    async fn load_sessions(&self) -> Result<Vec<PersistedSession>, StoreError>;
}

// ---------------------------------------------------------------------------
// PostgreSQL implementation
// ---------------------------------------------------------------------------

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DurableStore for PgStore {
    async fn upsert_vote(&self, item_id: &str, count: i64) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut conn = self.pool.get().await?;

        diesel::insert_into(votes::table)
            .values(NewVote {
                item_id,
                vote_count: count,
                updated_at: now,
            })
            .on_conflict(votes::item_id)
            .do_update()
            .set((votes::vote_count.eq(count), votes::updated_at.eq(now)))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn load_votes(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<VoteRow> = votes::table
            .select(VoteRow::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(|r| (r.item_id, r.vote_count)).collect())
    }

    async fn upsert_session(&self, session: &PersistedSession) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut conn = self.pool.get().await?;

        diesel::insert_into(sessions::table)
            .values(NewSessionRow {
                session_id: &session.session_id,
                user_id: &session.user_id,
                access_token: &session.access_token,
                refresh_token: session.refresh_token.as_deref(),
                token_expiry: session.token_expiry,
                created_at: now,
                updated_at: now,
            })
            .on_conflict(sessions::session_id)
            .do_update()
            .set((
                sessions::user_id.eq(&session.user_id),
                sessions::access_token.eq(&session.access_token),
                sessions::refresh_token.eq(session.refresh_token.as_deref()),
                sessions::token_expiry.eq(session.token_expiry),
                sessions::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        diesel::delete(sessions::table.filter(sessions::session_id.eq(session_id)))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn load_sessions(&self) -> Result<Vec<PersistedSession>, StoreError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<SessionRow> = sessions::table
            .select(SessionRow::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| PersistedSession {
                session_id: r.session_id,
                user_id: r.user_id,
                access_token: r.access_token,
                refresh_token: r.refresh_token,
                token_expiry: r.token_expiry,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryStore {
    votes: DashMap<String, i64>,
    sessions: DashMap<String, PersistedSession>,
    failing: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn vote(&self, item_id: &str) -> Option<i64> {
        self.votes.get(item_id).map(|v| *v)
    }

    pub fn session(&self, session_id: &str) -> Option<PersistedSession> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    fn check(&self) -> Result<(), StoreError> {
        // Fully qualified: `RunQueryDsl::load` is in scope in this module.
        if AtomicBool::load(&self.failing, Ordering::SeqCst) {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn upsert_vote(&self, item_id: &str, count: i64) -> Result<(), StoreError> {
        self.check()?;
        self.votes.insert(item_id.to_string(), count);
        Ok(())
    }

    async fn load_votes(&self) -> Result<Vec<(String, i64)>, StoreError> {
        self.check()?;
        Ok(self
            .votes
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect())
    }

    async fn upsert_session(&self, session: &PersistedSession) -> Result<(), StoreError> {
        self.check()?;
        self.sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        self.check()?;
        self.sessions.remove(session_id);
        Ok(())
    }

    async fn load_sessions(&self) -> Result<Vec<PersistedSession>, StoreError> {
        self.check()?;
        Ok(self.sessions.iter().map(|e| e.value().clone()).collect())
    }
}

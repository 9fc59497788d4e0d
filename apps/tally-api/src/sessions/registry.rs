//! Session id -> credential record, mirrored to the durable store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;

use super::record::CredentialRecord;
use crate::db::store::DurableStore;

/// Result of loading persisted sessions at startup.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HydrationReport {
    pub loaded: usize,
    pub expired: usize,
}

/// Shared registry of logged-in sessions.
///
/// Records are stored as `Arc<CredentialRecord>` and replaced whole, so a
/// `get` hands back either the old record or the new one, never a mix. The
/// map guard is never held across an `.await`.
///
/// Writers also take `writes` for the map change plus its durable mirror
/// write, so the store sees mutations in the same order as the map.
pub struct SessionRegistry {
    records: RwLock<HashMap<String, Arc<CredentialRecord>>>,
    writes: Mutex<()>,
    store: Arc<dyn DurableStore>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            writes: Mutex::new(()),
            store,
        }
    }

    /// Load persisted sessions, dropping any whose token expired more than
    /// `grace` before `now`. Their refresh tokens are not trusted either.
    pub async fn hydrate(&self, now: DateTime<Utc>, grace: Duration) -> HydrationReport {
        let rows = match self.store.load_sessions().await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::error!(?err, "failed to load sessions from store");
                return HydrationReport::default();
            }
        };

        // An unrepresentable grace window means nothing is old enough to drop.
        let cutoff = chrono::Duration::from_std(grace)
            .ok()
            .and_then(|grace| now.checked_sub_signed(grace));
        let mut report = HydrationReport::default();
        let mut records = self.records.write();
        for row in rows {
            if cutoff.is_some_and(|cutoff| row.token_expiry < cutoff) {
                report.expired += 1;
                continue;
            }
            let record = CredentialRecord::from_persisted(row, now);
            records.insert(record.session_id.clone(), Arc::new(record));
            report.loaded += 1;
        }
        drop(records);

        tracing::info!(
            loaded = report.loaded,
            expired = report.expired,
            "loaded sessions from store"
        );
        report
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<CredentialRecord>> {
        self.records.read().get(session_id).cloned()
    }

    /// Insert or replace the record for its session id, then persist it.
    pub async fn put(&self, record: CredentialRecord) -> Arc<CredentialRecord> {
        let record = Arc::new(record);
        let _writes = self.writes.lock().await;
        self.records
            .write()
            .insert(record.session_id.clone(), record.clone());
        self.persist(&record).await;
        record
    }

    /// Swap in `next` only if the registry still holds exactly `current`.
    ///
    /// Returns `false` when the session was removed or replaced in the
    /// meantime; `next` is then discarded and nothing is persisted.
    pub async fn replace_if_current(
        &self,
        current: &Arc<CredentialRecord>,
        next: CredentialRecord,
    ) -> bool {
        let next = Arc::new(next);
        let _writes = self.writes.lock().await;
        {
            let mut records = self.records.write();
            match records.get_mut(&current.session_id) {
                Some(slot) if Arc::ptr_eq(slot, current) => *slot = next.clone(),
                _ => return false,
            }
        }
        self.persist(&next).await;
        true
    }

    /// Remove a session from memory and from the durable mirror.
    pub async fn remove(&self, session_id: &str) -> Option<Arc<CredentialRecord>> {
        let _writes = self.writes.lock().await;
        let removed = self.records.write().remove(session_id);
        if let Err(err) = self.store.delete_session(session_id).await {
            tracing::warn!(?err, %session_id, "failed to delete session from store");
        }
        removed
    }

    /// Every record as of now.
    pub fn snapshot(&self) -> Vec<Arc<CredentialRecord>> {
        self.records.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn persist(&self, record: &CredentialRecord) {
        if let Err(err) = self.store.upsert_session(&record.to_persisted()).await {
            tracing::warn!(?err, session_id = %record.session_id, "failed to save session to store");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::db::store::{InMemoryStore, PersistedSession, StoreError};

    /// Holds the next armed `upsert_session` until `release` is notified.
    #[derive(Default)]
    struct StallingStore {
        inner: InMemoryStore,
        stall_next_upsert: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl DurableStore for StallingStore {
        async fn upsert_vote(&self, item_id: &str, count: i64) -> Result<(), StoreError> {
            self.inner.upsert_vote(item_id, count).await
        }

        async fn load_votes(&self) -> Result<Vec<(String, i64)>, StoreError> {
            self.inner.load_votes().await
        }

        async fn upsert_session(&self, session: &PersistedSession) -> Result<(), StoreError> {
            if self.stall_next_upsert.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.upsert_session(session).await
        }

        async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
            self.inner.delete_session(session_id).await
        }

        async fn load_sessions(&self) -> Result<Vec<PersistedSession>, StoreError> {
            self.inner.load_sessions().await
        }
    }

    fn record(session_id: &str, expiry: DateTime<Utc>) -> CredentialRecord {
        CredentialRecord {
            session_id: session_id.into(),
            user_id: "u1".into(),
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            expiry,
            last_refresh: Utc::now(),
        }
    }

    fn persisted(session_id: &str, expiry: DateTime<Utc>) -> PersistedSession {
        record(session_id, expiry).to_persisted()
    }

    #[tokio::test]
    async fn put_get_remove_round_trip_through_store() {
        let store = Arc::new(InMemoryStore::new());
        let registry = SessionRegistry::new(store.clone());
        let expiry = Utc::now() + ChronoDuration::hours(1);

        registry.put(record("ses_1", expiry)).await;
        assert_eq!(registry.get("ses_1").unwrap().user_id, "u1");
        assert_eq!(store.session("ses_1").unwrap().token_expiry, expiry);

        let removed = registry.remove("ses_1").await.unwrap();
        assert_eq!(removed.session_id, "ses_1");
        assert!(registry.get("ses_1").is_none());
        assert!(store.session("ses_1").is_none());
        assert!(registry.remove("ses_1").await.is_none());
    }

    #[tokio::test]
    async fn hydrate_drops_sessions_beyond_grace_window() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        store
            .upsert_session(&persisted("stale", now - ChronoDuration::hours(2)))
            .await
            .unwrap();
        store
            .upsert_session(&persisted("recent", now - ChronoDuration::minutes(10)))
            .await
            .unwrap();

        let registry = SessionRegistry::new(store);
        let report = registry.hydrate(now, Duration::from_secs(3600)).await;

        assert_eq!(report, HydrationReport { loaded: 1, expired: 1 });
        assert!(registry.get("stale").is_none());
        assert!(registry.get("recent").is_some());
    }

    #[tokio::test]
    async fn hydrate_survives_store_failure() {
        let store = Arc::new(InMemoryStore::new());
        store.set_failing(true);
        let registry = SessionRegistry::new(store);
        let report = registry.hydrate(Utc::now(), Duration::from_secs(3600)).await;
        assert_eq!(report, HydrationReport::default());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn replace_if_current_rejects_superseded_record() {
        let store = Arc::new(InMemoryStore::new());
        let registry = SessionRegistry::new(store.clone());
        let expiry = Utc::now() + ChronoDuration::minutes(2);

        let original = registry.put(record("ses_1", expiry)).await;

        // A re-login lands while a renewal of `original` is in flight.
        let mut relogin = record("ses_1", expiry + ChronoDuration::hours(1));
        relogin.access_token = "relogin".into();
        registry.put(relogin).await;

        let mut renewed = (*original).clone();
        renewed.access_token = "renewed".into();
        assert!(!registry.replace_if_current(&original, renewed).await);
        assert_eq!(registry.get("ses_1").unwrap().access_token, "relogin");
        assert_eq!(store.session("ses_1").unwrap().access_token, "relogin");
    }

    #[tokio::test]
    async fn replace_if_current_skips_removed_session() {
        let registry = SessionRegistry::new(Arc::new(InMemoryStore::new()));
        let original = registry
            .put(record("ses_1", Utc::now() + ChronoDuration::minutes(2)))
            .await;
        registry.remove("ses_1").await;

        assert!(!registry.replace_if_current(&original, (*original).clone()).await);
        assert!(registry.get("ses_1").is_none());
    }

    #[tokio::test]
    async fn store_failure_does_not_block_put() {
        let store = Arc::new(InMemoryStore::new());
        store.set_failing(true);
        let registry = SessionRegistry::new(store.clone());
        registry
            .put(record("ses_1", Utc::now() + ChronoDuration::hours(1)))
            .await;
        assert!(registry.get("ses_1").is_some());
        store.set_failing(false);
        assert!(store.session("ses_1").is_none());
    }

    #[tokio::test]
    async fn logout_during_slow_renewal_write_stays_logged_out() {
        let store = Arc::new(StallingStore::default());
        let registry = Arc::new(SessionRegistry::new(store.clone()));
        let original = registry
            .put(record("ses_1", Utc::now() + ChronoDuration::minutes(2)))
            .await;

        store.stall_next_upsert.store(true, Ordering::SeqCst);
        let renewal = tokio::spawn({
            let registry = registry.clone();
            let original = original.clone();
            async move {
                let mut renewed = (*original).clone();
                renewed.access_token = "renewed".into();
                registry.replace_if_current(&original, renewed).await
            }
        });
        store.entered.notified().await;

        let logout = tokio::spawn({
            let registry = registry.clone();
            async move { registry.remove("ses_1").await.is_some() }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        store.release.notify_one();

        assert!(renewal.await.unwrap());
        assert!(logout.await.unwrap());
        assert!(registry.get("ses_1").is_none());
        assert!(store.inner.session("ses_1").is_none());

        let restarted = SessionRegistry::new(store.clone());
        restarted.hydrate(Utc::now(), Duration::from_secs(3600)).await;
        assert!(restarted.is_empty());
    }

    #[tokio::test]
    async fn logout_during_slow_login_write_stays_logged_out() {
        let store = Arc::new(StallingStore::default());
        let registry = Arc::new(SessionRegistry::new(store.clone()));

        store.stall_next_upsert.store(true, Ordering::SeqCst);
        let login = tokio::spawn({
            let registry = registry.clone();
            async move {
                registry
                    .put(record("ses_1", Utc::now() + ChronoDuration::hours(1)))
                    .await;
            }
        });
        store.entered.notified().await;

        let logout = tokio::spawn({
            let registry = registry.clone();
            async move { registry.remove("ses_1").await.is_some() }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        store.release.notify_one();

        login.await.unwrap();
        assert!(logout.await.unwrap());
        assert!(registry.get("ses_1").is_none());
        assert!(store.inner.session("ses_1").is_none());
    }
}

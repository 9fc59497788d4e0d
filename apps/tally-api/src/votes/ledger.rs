//! Authoritative in-memory vote counts.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::db::store::DurableStore;
use crate::error::ApiError;
use crate::gateway::hub::{BroadcastHub, ChangeEvent};

/// A single vote. Anything other than +1/-1 is rejected at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteDelta {
    Up,
    Down,
}

impl VoteDelta {
    pub fn value(self) -> i64 {
        match self {
            VoteDelta::Up => 1,
            VoteDelta::Down => -1,
        }
    }
}

impl TryFrom<i64> for VoteDelta {
    type Error = ApiError;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(VoteDelta::Up),
            -1 => Ok(VoteDelta::Down),
            _ => Err(ApiError::bad_request("Vote must be 1 or -1")),
        }
    }
}

/// Item id -> signed vote count. Reads never touch the durable store.
pub struct VoteLedger {
    counts: RwLock<HashMap<String, i64>>,
    store: Arc<dyn DurableStore>,
    hub: Arc<BroadcastHub>,
}

impl VoteLedger {
    pub fn new(store: Arc<dyn DurableStore>, hub: Arc<BroadcastHub>) -> Self {
        Self {
            counts: RwLock::new(HashMap::new()),
            store,
            hub,
        }
    }

    /// Load persisted counts. A failed load leaves the ledger empty.
    pub async fn hydrate(&self) -> usize {
        let rows = match self.store.load_votes().await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::error!(?err, "failed to load votes from store");
                return 0;
            }
        };

        let loaded = rows.len();
        self.counts.write().extend(rows);
        tracing::info!(loaded, "loaded votes from store");
        loaded
    }

    /// Apply one vote and return the new count for `item_id`.
    ///
    /// The change event is enqueued while the map guard is held so relay order
    /// matches ledger order per item. The durable write happens after the guard
    /// is released and its failure is only logged.
    pub async fn apply_vote(&self, item_id: &str, delta: VoteDelta) -> i64 {
        let count = {
            let mut counts = self.counts.write();
            let entry = counts.entry(item_id.to_string()).or_insert(0);
            *entry += delta.value();
            let count = *entry;
            self.hub.publish(ChangeEvent {
                item_id: item_id.to_string(),
                count,
            });
            count
        };

        if let Err(err) = self.store.upsert_vote(item_id, count).await {
            tracing::warn!(?err, %item_id, count, "failed to persist vote; periodic sync will retry");
        }

        count
    }

    /// Current count for one item (0 if never voted on).
    pub fn get(&self, item_id: &str) -> i64 {
        self.counts.read().get(item_id).copied().unwrap_or(0)
    }

    /// Point-in-time copy of every count.
    pub fn read_all(&self) -> HashMap<String, i64> {
        self.counts.read().clone()
    }

    /// Mirror the whole ledger to the durable store. Returns how many rows
    /// were written successfully.
    pub async fn sync_to_store(&self) -> usize {
        let snapshot = self.read_all();
        let mut synced = 0;
        for (item_id, count) in &snapshot {
            match self.store.upsert_vote(item_id, *count).await {
                Ok(()) => synced += 1,
                Err(err) => {
                    tracing::warn!(?err, %item_id, "failed to sync votes for item");
                }
            }
        }
        if synced > 0 {
            tracing::info!(synced, total = snapshot.len(), "synced votes to store");
        }
        synced
    }
}

//! Periodic durable sync of the whole ledger.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use super::ledger::VoteLedger;

/// Spawn the sweep that mirrors the ledger to the store every `period`.
///
/// The first sync happens one full period after startup; hydration already
/// made memory and store agree.
pub fn spawn_vote_sync(ledger: Arc<VoteLedger>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // First tick fires immediately; skip it.

        loop {
            ticker.tick().await;
            ledger.sync_to_store().await;
        }
    })
}

//! Broadcast hub relaying vote changes to every connected subscriber.
//!
//! Producers push into a single unbounded inbound queue, so `publish` never
//! waits on a consumer. One relay task drains that queue in order and hands
//! each event to every subscriber's own bounded queue with `try_send`. A
//! subscriber whose queue is full or closed is evicted on the spot; the rest
//! of the set still receives the event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tally_common::VoteUpdate;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

pub type SubscriberId = u64;

/// One ledger mutation, relayed to subscribers and then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub item_id: String,
    pub count: i64,
}

impl From<&ChangeEvent> for VoteUpdate {
    fn from(event: &ChangeEvent) -> Self {
        VoteUpdate {
            track_id: event.item_id.clone(),
            votes: event.count,
        }
    }
}

type Subscribers = RwLock<HashMap<SubscriberId, mpsc::Sender<Arc<ChangeEvent>>>>;

/// The shared hub. Store behind an `Arc` in `AppState`.
pub struct BroadcastHub {
    inbound: mpsc::UnboundedSender<ChangeEvent>,
    subscribers: Arc<Subscribers>,
    next_id: AtomicU64,
    buffer: usize,
}

/// Drains the inbound queue. Runs until every [`BroadcastHub`] handle is dropped.
pub struct Relay {
    inbound: mpsc::UnboundedReceiver<ChangeEvent>,
    subscribers: Arc<Subscribers>,
}

/// A live registration. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    events: mpsc::Receiver<Arc<ChangeEvent>>,
    subscribers: Arc<Subscribers>,
}

impl BroadcastHub {
    /// Create a hub and its relay. `buffer` is the per-subscriber queue depth.
    pub fn new(buffer: usize) -> (Self, Relay) {
        let (inbound, inbound_rx) = mpsc::unbounded_channel();
        let subscribers = Arc::new(RwLock::new(HashMap::new()));
        let hub = Self {
            inbound,
            subscribers: subscribers.clone(),
            next_id: AtomicU64::new(0),
            buffer: buffer.max(1),
        };
        let relay = Relay {
            inbound: inbound_rx,
            subscribers,
        };
        (hub, relay)
    }

    /// Create a hub and spawn its relay on the current runtime.
    pub fn spawn(buffer: usize) -> (Arc<Self>, JoinHandle<()>) {
        let (hub, relay) = Self::new(buffer);
        let handle = tokio::spawn(relay.run());
        (Arc::new(hub), handle)
    }

    /// Register a new subscriber. Only events relayed after this call are
    /// delivered to it.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers.write().insert(id, tx);
        tracing::debug!(subscriber = id, "subscriber registered");
        Subscription {
            id,
            events: rx,
            subscribers: self.subscribers.clone(),
        }
    }

    /// Remove a subscriber. Unknown or already-removed ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.subscribers.write().remove(&id).is_some() {
            tracing::debug!(subscriber = id, "subscriber removed");
        }
    }

    /// Enqueue an event for relay. Never waits on any subscriber.
    pub fn publish(&self, event: ChangeEvent) {
        if self.inbound.send(event).is_err() {
            tracing::warn!("broadcast relay has stopped; dropping event");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Relay {
    pub async fn run(mut self) {
        while let Some(event) = self.inbound.recv().await {
            relay_event(&self.subscribers, event);
        }
        tracing::debug!("broadcast relay stopped");
    }
}

/// Deliver one event to the subscriber set as it stands right now.
/// Returns the number of subscribers that accepted it.
fn relay_event(subscribers: &Subscribers, event: ChangeEvent) -> usize {
    let event = Arc::new(event);
    let targets: Vec<(SubscriberId, mpsc::Sender<Arc<ChangeEvent>>)> = subscribers
        .read()
        .iter()
        .map(|(id, tx)| (*id, tx.clone()))
        .collect();

    let mut delivered = 0;
    let mut dead = Vec::new();
    for (id, tx) in targets {
        match tx.try_send(event.clone()) {
            Ok(()) => delivered += 1,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(subscriber = id, item_id = %event.item_id, "subscriber queue full; evicting");
                dead.push(id);
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(subscriber = id, "subscriber gone; evicting");
                dead.push(id);
            }
        }
    }

    if !dead.is_empty() {
        let mut set = subscribers.write();
        for id in dead {
            set.remove(&id);
        }
    }

    delivered
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next event, or `None` once this subscriber has been removed from the hub.
    pub async fn recv(&mut self) -> Option<Arc<ChangeEvent>> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.subscribers.write().remove(&self.id);
    }
}

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod provider;
pub mod routes;
pub mod sessions;
pub mod votes;

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;

use config::Config;
use db::kv::KeyValueStore;
use db::store::DurableStore;
use gateway::hub::BroadcastHub;
use provider::{ContentProvider, TokenRenewer};
use sessions::{CredentialRefresher, SessionRegistry};
use votes::VoteLedger;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub kv: Arc<dyn KeyValueStore>,
    pub ledger: Arc<VoteLedger>,
    pub sessions: Arc<SessionRegistry>,
    pub hub: Arc<BroadcastHub>,
    pub provider: Arc<dyn ContentProvider>,
}

/// External collaborators the core is built over.
pub struct Backends {
    pub store: Arc<dyn DurableStore>,
    pub kv: Arc<dyn KeyValueStore>,
    pub provider: Arc<dyn ContentProvider>,
    pub renewer: Arc<dyn TokenRenewer>,
}

/// Everything `start` brought up. The background tasks run until aborted or
/// the runtime shuts down.
pub struct Running {
    pub state: AppState,
    pub refresher: Arc<CredentialRefresher>,
    pub tasks: Vec<JoinHandle<()>>,
}

impl Running {
    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Hydrate the ledger and session registry from the store, then spawn the
/// broadcast relay, the vote sync sweep and the token refresh sweep.
pub async fn start(config: Config, backends: Backends) -> Running {
    let intervals = config.intervals;

    let (hub, relay) = BroadcastHub::spawn(config.subscriber_buffer);

    let ledger = Arc::new(VoteLedger::new(backends.store.clone(), hub.clone()));
    ledger.hydrate().await;

    let sessions = Arc::new(SessionRegistry::new(backends.store));
    sessions.hydrate(Utc::now(), intervals.session_grace).await;

    let refresher = Arc::new(CredentialRefresher::new(
        sessions.clone(),
        backends.renewer,
        intervals.refresh_lookahead,
        intervals.renewal_timeout,
    ));

    let tasks = vec![
        relay,
        votes::spawn_vote_sync(ledger.clone(), intervals.vote_sync),
        refresher.clone().spawn(intervals.token_refresh),
    ];

    tracing::info!(
        vote_sync_secs = intervals.vote_sync.as_secs(),
        token_refresh_secs = intervals.token_refresh.as_secs(),
        "background sweeps started"
    );

    Running {
        state: AppState {
            config: Arc::new(config),
            kv: backends.kv,
            ledger,
            sessions,
            hub,
            provider: backends.provider,
        },
        refresher,
        tasks,
    }
}

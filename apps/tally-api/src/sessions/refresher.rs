//! Background renewal of credentials nearing expiry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use super::record::CredentialRecord;
use super::registry::SessionRegistry;
use crate::provider::{ProviderError, TokenRenewer};

/// Renewals in flight at once during a sweep.
const MAX_CONCURRENT_RENEWALS: usize = 8;

/// What happened to the records a sweep looked at.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub due: usize,
    pub refreshed: usize,
    pub failed: usize,
    /// Renewed, but the session was logged out or re-authorized meanwhile.
    pub superseded: usize,
}

enum Outcome {
    Refreshed,
    Failed,
    Superseded,
}

pub struct CredentialRefresher {
    registry: Arc<SessionRegistry>,
    renewer: Arc<dyn TokenRenewer>,
    lookahead: chrono::Duration,
    timeout: Duration,
}

impl CredentialRefresher {
    pub fn new(
        registry: Arc<SessionRegistry>,
        renewer: Arc<dyn TokenRenewer>,
        lookahead: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            renewer,
            lookahead: chrono::Duration::from_std(lookahead).unwrap_or(chrono::Duration::zero()),
            timeout,
        }
    }

    /// Renew every record due at `now`. A failed or timed-out renewal leaves
    /// the record untouched for the next sweep.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let due: Vec<Arc<CredentialRecord>> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|r| r.needs_refresh(now, self.lookahead))
            .collect();

        let mut report = SweepReport {
            due: due.len(),
            ..SweepReport::default()
        };
        if due.is_empty() {
            return report;
        }

        let outcomes: Vec<Outcome> = stream::iter(due)
            .map(|record| self.refresh_one(record))
            .buffer_unordered(MAX_CONCURRENT_RENEWALS)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Outcome::Refreshed => report.refreshed += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Superseded => report.superseded += 1,
            }
        }

        tracing::info!(
            due = report.due,
            refreshed = report.refreshed,
            failed = report.failed,
            superseded = report.superseded,
            "token refresh sweep finished"
        );
        report
    }

    async fn refresh_one(&self, record: Arc<CredentialRecord>) -> Outcome {
        tracing::info!(
            session_id = %record.session_id,
            user_id = %record.user_id,
            expiry = %record.expiry,
            "refreshing token"
        );

        let grant = match self.renew(&record).await {
            Ok(grant) => grant,
            Err(err) => {
                tracing::warn!(
                    ?err,
                    session_id = %record.session_id,
                    user_id = %record.user_id,
                    "failed to refresh token; will retry next sweep"
                );
                return Outcome::Failed;
            }
        };

        let next = record.renewed(grant, Utc::now());
        let expiry = next.expiry;
        if self.registry.replace_if_current(&record, next).await {
            tracing::info!(user_id = %record.user_id, %expiry, "token refreshed");
            Outcome::Refreshed
        } else {
            tracing::debug!(session_id = %record.session_id, "session changed during refresh; discarding");
            Outcome::Superseded
        }
    }

    async fn renew(&self, record: &CredentialRecord) -> Result<crate::provider::TokenGrant, RenewError> {
        let refresh_token = record
            .refresh_token
            .as_deref()
            .ok_or(RenewError::Provider(ProviderError::MissingRefreshToken))?;
        time::timeout(self.timeout, self.renewer.renew(refresh_token))
            .await
            .map_err(|_| RenewError::TimedOut(self.timeout))?
            .map_err(RenewError::Provider)
    }

    /// Spawn the periodic sweep. The first sweep runs one `period` after start.
    pub fn spawn(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // First tick fires immediately; skip it.

            loop {
                ticker.tick().await;
                self.sweep(Utc::now()).await;
            }
        })
    }
}

#[derive(Debug, thiserror::Error)]
enum RenewError {
    #[error(transparent)]
    Provider(ProviderError),

    #[error("renewal timed out after {0:?}")]
    TimedOut(Duration),
}

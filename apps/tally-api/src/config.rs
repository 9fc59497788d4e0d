use std::time::Duration;

/// Tally API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// OAuth client ID issued by the content provider.
    pub provider_client_id: String,
    /// OAuth client secret issued by the content provider.
    pub provider_client_secret: String,
    /// Where the provider sends the user back after authorization.
    pub redirect_url: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    pub intervals: Intervals,
    /// Per-subscriber outbound queue depth before a subscriber is evicted.
    pub subscriber_buffer: usize,
}

/// Tunable timings for the background sweeps.
#[derive(Debug, Clone, Copy)]
pub struct Intervals {
    /// How often the whole ledger is mirrored to the durable store.
    pub vote_sync: Duration,
    /// How often the credential refresher scans the session registry.
    pub token_refresh: Duration,
    /// Credentials expiring within this window are renewed by a sweep.
    pub refresh_lookahead: Duration,
    /// Upper bound on a single renewal call.
    pub renewal_timeout: Duration,
    /// Persisted sessions that expired longer ago than this are dropped on startup.
    pub session_grace: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            vote_sync: Duration::from_secs(30),
            token_refresh: Duration::from_secs(10 * 60),
            refresh_lookahead: Duration::from_secs(5 * 60),
            renewal_timeout: Duration::from_secs(15),
            session_grace: Duration::from_secs(60 * 60),
        }
    }
}

pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        let defaults = Intervals::default();
        Self {
            database_url: required_var("DATABASE_URL"),
            provider_client_id: required_var("SPOTIFY_ID"),
            provider_client_secret: required_var("SPOTIFY_SECRET"),
            redirect_url: redirect_url(
                std::env::var("FLY_APP_NAME").ok(),
                std::env::var("REDIRECT_URL").ok(),
            ),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            intervals: Intervals {
                vote_sync: secs_var("VOTE_SYNC_INTERVAL_SECS", defaults.vote_sync),
                token_refresh: secs_var("TOKEN_REFRESH_INTERVAL_SECS", defaults.token_refresh),
                refresh_lookahead: secs_var(
                    "TOKEN_REFRESH_LOOKAHEAD_SECS",
                    defaults.refresh_lookahead,
                ),
                renewal_timeout: secs_var("TOKEN_RENEWAL_TIMEOUT_SECS", defaults.renewal_timeout),
                session_grace: secs_var("SESSION_GRACE_SECS", defaults.session_grace),
            },
            subscriber_buffer: std::env::var("SUBSCRIBER_BUFFER")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(DEFAULT_SUBSCRIBER_BUFFER),
        }
    }
}

/// Fly.io deployments get their public callback; otherwise an explicit
/// override wins over the localhost default.
fn redirect_url(fly_app_name: Option<String>, custom: Option<String>) -> String {
    if let Some(app) = fly_app_name.filter(|s| !s.is_empty()) {
        return format!("https://{app}.fly.dev/callback");
    }
    custom
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "http://localhost:8080/callback".to_string())
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn secs_var(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

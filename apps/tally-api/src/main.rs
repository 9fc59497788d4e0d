use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tally_api::config::Config;
use tally_api::db::kv::{KeyValueStore, MemoryStore};
use tally_api::db::store::{DurableStore, PgStore};
use tally_api::provider::{ContentProvider, SpotifyClient, TokenRenewer};
use tally_api::Backends;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    // Without the durable store there is nothing to hydrate from; give up.
    let pool = match tally_api::db::pool::connect(&config.database_url).await {
        Ok(pool) => pool,
        Err(err) => {
            tracing::error!(?err, "failed to connect to database");
            std::process::exit(1);
        }
    };
    let store: Arc<dyn DurableStore> = Arc::new(PgStore::new(pool));

    // OAuth state only lives for the few minutes of a login round trip.
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

    let spotify = Arc::new(SpotifyClient::new(
        &config.provider_client_id,
        &config.provider_client_secret,
        &config.redirect_url,
    ));
    let provider: Arc<dyn ContentProvider> = spotify.clone();
    let renewer: Arc<dyn TokenRenewer> = spotify;

    tracing::info!(redirect_url = %config.redirect_url, "tally-api configured");

    let running = tally_api::start(
        config,
        Backends {
            store,
            kv,
            provider,
            renewer,
        },
    )
    .await;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(tally_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(running.state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "tally-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    running.shutdown();
    running.state.ledger.sync_to_store().await;
    tracing::info!("tally-api stopped");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

//! WebSocket upgrade handler and per-connection event loop.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tally_common::VoteUpdate;
use tokio::time;

use crate::AppState;

use super::hub::Subscription;

/// Server ping cadence.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Close code sent when the hub evicted this connection for falling behind.
const CLOSE_TOO_SLOW: u16 = 4008;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    // Subscribe before the upgrade completes so nothing published after the
    // handshake is missed.
    let subscription = state.hub.subscribe();
    ws.on_upgrade(move |socket| handle_connection(socket, subscription))
}

async fn handle_connection(socket: WebSocket, mut subscription: Subscription) {
    let subscriber_id = subscription.id();
    tracing::info!(subscriber_id, "websocket client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut ping = time::interval(PING_INTERVAL);
    ping.tick().await; // First tick fires immediately; skip it.

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    // Clients only listen; anything they send is ignored.
                    Some(Ok(Message::Text(_))) | Some(Ok(Message::Binary(_))) => continue,
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, subscriber_id, "ws read error");
                        break;
                    }
                }
            }

            event = subscription.recv() => {
                let Some(event) = event else {
                    tracing::warn!(subscriber_id, "subscriber evicted; closing connection");
                    let _ = send_close(&mut ws_tx, CLOSE_TOO_SLOW, "Too slow").await;
                    break;
                };

                let json = match serde_json::to_string(&VoteUpdate::from(event.as_ref())) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(?e, "failed to encode vote update");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(json.into())).await.is_err() {
                    tracing::debug!(subscriber_id, "ws write failed");
                    break;
                }
            }

            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    // Dropping the subscription removes it from the hub.
    drop(subscription);
    tracing::info!(subscriber_id, "websocket client disconnected");
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(axum::extract::ws::CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}

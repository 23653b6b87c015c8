//! Realtime Websocket Channel
//!
//! One persistent, bidirectional socket per connected client. The server
//! pushes serialized fanout events (`mark.created` / `mark.expired`);
//! the client may send a text `ping` which is answered with `pong` so it
//! can detect a dead connection. There is no per-client filtering and no
//! replay: a fresh client pulls `GET /marks` for its snapshot and merges
//! events idempotently by mark id.
//!
//! Losing a connection only ends its handler task; server-side state is
//! never touched by disconnects.

use crate::http::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tracing::debug;

/// `GET /ws` — upgrade to the realtime channel.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut events = state.fanout.subscribe();
    let (mut sender, mut receiver) = socket.split();

    debug!("realtime client connected");

    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else { break };
                let Ok(text) = serde_json::to_string(&event) else {
                    continue;
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) if text.as_str() == "ping" => {
                        if sender.send(Message::Text("pong".into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(%err, "websocket read error");
                        break;
                    }
                }
            }
        }
    }

    debug!("realtime client disconnected");
}

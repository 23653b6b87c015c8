//! HTTP Surface
//!
//! This module wires the REST API and the realtime websocket channel:
//!
//! - `POST /marks` — create a mark (201 + the persisted record)
//! - `GET /marks` — snapshot of active marks, ascending by expiry
//! - `POST /push/subscribe` — store a push subscription (201)
//! - `GET /ws` — realtime channel: `mark.created` / `mark.expired` out,
//!   text `ping` answered with `pong`
//! - `GET /healthz` — liveness probe
//!
//! ## Request Flow for Mark Creation
//!
//! ```text
//! POST /marks
//!     │ validate payload            (reject 400, nothing mutated)
//!     ▼
//! reverse geocode (best-effort)     (failure → no street label)
//!     ▼
//! MarkStore::put                    (record + index writes)
//!     ▼
//! Fanout::publish(mark.created)     (synchronous, after put completes)
//!     ▼
//! spawn push broadcast              (fire-and-forget, outcome only logged)
//!     ▼
//! 201 Created + mark JSON
//! ```

pub mod handlers;
pub mod ws;

use crate::events::Fanout;
use crate::geocode::ReverseGeocoder;
use crate::push::PushRegistry;
use crate::store::MarkStore;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MarkStore>,
    pub fanout: Fanout,
    pub push: Arc<PushRegistry>,
    pub geocoder: Arc<dyn ReverseGeocoder>,
}

/// Builds the application router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/marks",
            get(handlers::list_marks).post(handlers::create_mark),
        )
        .route("/push/subscribe", post(handlers::subscribe_push))
        .route("/ws", get(ws::ws_handler))
        .route("/healthz", get(handlers::healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy: locked to the configured public origin when one is set,
/// otherwise permissive (local development).
pub fn cors_layer(public_origin: Option<String>) -> CorsLayer {
    match public_origin.and_then(|origin| origin.parse::<HeaderValue>().ok()) {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    }
}

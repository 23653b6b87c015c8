//! REST Handlers
//!
//! Creation, snapshot, and subscription endpoints plus the error type that
//! maps failures onto HTTP statuses. Validation failures answer 400 with a
//! short message and mutate nothing; anything unexpected answers a generic
//! 500 while the detail goes to the log only.

use crate::events::Event;
use crate::http::AppState;
use crate::model::{Mark, MarkColor, PushSubscriptionRecord, SubscriptionKeys};
use crate::store::ACTIVE_QUERY_LIMIT;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Errors surfaced by the synchronous request path.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed creation or subscription input. Nothing was mutated.
    #[error("{0}")]
    Validation(String),

    /// Unexpected internal failure; detail is logged, not leaked.
    #[error("internal error")]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": message })),
            )
                .into_response(),
            ApiError::Internal(err) => {
                error!(error = %err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}

/// Body of `POST /marks`. Serde enforces numeric coordinates and one of the
/// three known colors.
#[derive(Debug, Deserialize)]
pub struct CreateMarkRequest {
    pub lat: f64,
    pub lng: f64,
    pub color: MarkColor,
}

/// Body of `POST /push/subscribe`.
#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

/// `POST /marks` — create a mark.
///
/// Enrichment runs first and is tolerant; `put` completes before the
/// `mark.created` event goes out; the push broadcast is spawned and never
/// awaited, so its outcome cannot affect this response.
pub async fn create_mark(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    let request: CreateMarkRequest = serde_json::from_value(body)
        .map_err(|_| ApiError::Validation("invalid payload".to_string()))?;

    let street = state.geocoder.lookup(request.lat, request.lng).await;

    let mark = Mark::new(request.lat, request.lng, request.color, street, Utc::now());
    state.store.put(mark.clone());

    state.fanout.publish(Event::MarkCreated { mark: mark.clone() });

    spawn_push_broadcast(&state, &mark);

    debug!(id = %mark.id, color = mark.color.display_name(), "mark created");
    Ok((StatusCode::CREATED, Json(mark)))
}

/// `GET /marks` — active marks ascending by expiry. An empty list is a
/// normal answer, not an error.
pub async fn list_marks(State(state): State<AppState>) -> Json<Vec<Mark>> {
    Json(state.store.get_active(Utc::now(), ACTIVE_QUERY_LIMIT))
}

/// `POST /push/subscribe` — store a push subscription.
///
/// The endpoint and both key fields must be present and non-empty. The
/// acknowledgement does not reveal whether push is enabled.
pub async fn subscribe_push(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    let request: SubscribeRequest = serde_json::from_value(body)
        .map_err(|_| ApiError::Validation("invalid subscription".to_string()))?;

    if request.endpoint.trim().is_empty()
        || request.keys.p256dh.trim().is_empty()
        || request.keys.auth.trim().is_empty()
    {
        return Err(ApiError::Validation("invalid subscription".to_string()));
    }

    let record = PushSubscriptionRecord::new(request.endpoint, request.keys, Utc::now());
    state.push.add(record);

    Ok((StatusCode::CREATED, Json(json!({ "ok": true }))))
}

/// `GET /healthz` — liveness probe.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Spawns the fire-and-forget push broadcast for a freshly created mark.
/// The triggering request returns without waiting for it.
fn spawn_push_broadcast(state: &AppState, mark: &Mark) {
    let push = Arc::clone(&state.push);
    let mark = mark.clone();
    tokio::spawn(async move {
        let body = notification_body(&mark);
        let data = json!({
            "id": mark.id,
            "lat": mark.lat,
            "lng": mark.lng,
            "color": mark.color,
        });
        push.broadcast("New mark", &body, data).await;
    });
}

/// "Blue mark on Soborna Street 12", or just "Blue mark" without a label.
fn notification_body(mark: &Mark) -> String {
    match &mark.street {
        Some(street) => format!("{} mark on {}", mark.color.display_name(), street),
        None => format!("{} mark", mark.color.display_name()),
    }
}

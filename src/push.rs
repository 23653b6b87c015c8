//! Push Subscription Registry and Best-Effort Delivery
//!
//! Disconnected clients learn about new marks through web push. The registry
//! keeps the subscriptions handed to us by browsers and broadcasts a small
//! notification payload to each of them when a mark appears.
//!
//! ## Enablement Latch
//!
//! Push only works with VAPID credentials configured. Rather than checking
//! an ambient flag on every call, [`PushRegistry::new`] decides once at
//! construction: with credentials it returns a fully functional registry,
//! without them a permanently disabled one whose `add` and `broadcast` are
//! logged no-ops. There is no re-check or recovery path for the process
//! lifetime.
//!
//! ## Delivery Classification
//!
//! Every delivery attempt is isolated; one subscriber's failure never aborts
//! the others or reaches the caller. Outcomes:
//!
//! - **gone** — the push service reports the endpoint permanently invalid
//!   (HTTP 404/410); the record is removed from the registry.
//! - **transient** — anything else; logged, record retained for next time.
//!
//! Payload encryption for the push transport is handled outside this
//! service; the transport posts the JSON payload as-is with a TTL header.

use crate::model::PushSubscriptionRecord;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Notification lifetime hint passed to the push service, in seconds.
/// Matches the mark TTL: a notification for an expired mark is worthless.
const PUSH_TTL_SECONDS: u32 = 1800;

/// Timeout for a single delivery attempt.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Icon shipped with every notification, resolved by the receiving client.
const NOTIFICATION_ICON: &str = "/icons/icon-192.png";

/// VAPID credentials identifying this server to push services.
#[derive(Debug, Clone)]
pub struct VapidConfig {
    pub public_key: String,
    pub private_key: String,
    pub subject: String,
}

impl VapidConfig {
    /// Reads credentials from `VAPID_PUBLIC_KEY`, `VAPID_PRIVATE_KEY` and
    /// `VAPID_SUBJECT`. Returns `None` unless both keys are present and
    /// non-empty; the subject falls back to a mailto default.
    pub fn from_env() -> Option<Self> {
        let public_key = std::env::var("VAPID_PUBLIC_KEY").ok()?;
        let private_key = std::env::var("VAPID_PRIVATE_KEY").ok()?;
        if public_key.trim().is_empty() || private_key.trim().is_empty() {
            return None;
        }
        let subject = std::env::var("VAPID_SUBJECT")
            .unwrap_or_else(|_| "mailto:admin@example.com".to_string());
        Some(Self {
            public_key,
            private_key,
            subject,
        })
    }
}

/// The notification body shipped to clients. Opaque to the push transport,
/// rendered by the receiving service worker.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
    pub icon: String,
}

impl PushPayload {
    pub fn new(title: impl Into<String>, body: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data,
            icon: NOTIFICATION_ICON.to_string(),
        }
    }
}

/// A failed delivery attempt.
#[derive(Debug, Error)]
pub enum PushError {
    /// The push service reported the subscription permanently invalid.
    #[error("subscription gone (status {status})")]
    Gone { status: u16 },

    /// The push service answered with an unexpected status.
    #[error("push service returned status {status}")]
    Status { status: u16 },

    /// The request never completed (connect failure, timeout, ...).
    #[error("push request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl PushError {
    /// True when the subscription should be pruned.
    pub fn is_gone(&self) -> bool {
        matches!(self, PushError::Gone { .. })
    }
}

/// The seam between the registry and the wire. Production uses
/// [`HttpPushTransport`]; tests substitute fakes.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(
        &self,
        subscription: &PushSubscriptionRecord,
        payload: &PushPayload,
    ) -> Result<(), PushError>;
}

/// Delivers notifications by POSTing the JSON payload to the subscription
/// endpoint. HTTP 404 and 410 classify the endpoint as gone, per web push
/// semantics.
pub struct HttpPushTransport {
    client: reqwest::Client,
    vapid: VapidConfig,
}

impl HttpPushTransport {
    pub fn new(client: reqwest::Client, vapid: VapidConfig) -> Self {
        Self { client, vapid }
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn deliver(
        &self,
        subscription: &PushSubscriptionRecord,
        payload: &PushPayload,
    ) -> Result<(), PushError> {
        let response = self
            .client
            .post(&subscription.endpoint)
            .header("TTL", PUSH_TTL_SECONDS)
            .header("Crypto-Key", format!("p256ecdsa={}", self.vapid.public_key))
            .json(payload)
            .timeout(DELIVERY_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        match status.as_u16() {
            404 | 410 => Err(PushError::Gone {
                status: status.as_u16(),
            }),
            code => Err(PushError::Status { status: code }),
        }
    }
}

/// Subscription set plus delivery fanout.
///
/// Wrap in an `Arc` and share between the subscribe handler and the
/// creation path's fire-and-forget broadcast tasks.
pub struct PushRegistry {
    /// `None` when push is permanently disabled for this process.
    inner: Option<Active>,
}

struct Active {
    subscriptions: RwLock<Vec<PushSubscriptionRecord>>,
    transport: Arc<dyn PushTransport>,
    delivered: AtomicU64,
    pruned: AtomicU64,
}

impl PushRegistry {
    /// Builds the registry from optional VAPID credentials, deciding the
    /// enablement latch once for the process lifetime.
    pub fn new(client: reqwest::Client, vapid: Option<VapidConfig>) -> Self {
        match vapid {
            Some(vapid) => {
                info!(subject = %vapid.subject, "push delivery enabled");
                Self::with_transport(Arc::new(HttpPushTransport::new(client, vapid)))
            }
            None => {
                warn!("VAPID keys not configured, push delivery disabled for this process");
                Self::disabled()
            }
        }
    }

    /// Builds an active registry over an arbitrary transport.
    pub fn with_transport(transport: Arc<dyn PushTransport>) -> Self {
        Self {
            inner: Some(Active {
                subscriptions: RwLock::new(Vec::new()),
                transport,
                delivered: AtomicU64::new(0),
                pruned: AtomicU64::new(0),
            }),
        }
    }

    /// Builds the permanently disabled stub.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// True when push delivery is operational.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Number of stored subscriptions.
    pub fn len(&self) -> usize {
        match &self.inner {
            Some(active) => active.subscriptions.read().unwrap().len(),
            None => 0,
        }
    }

    /// True when no subscriptions are stored (always true when disabled).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a subscription to the registry.
    ///
    /// Duplicates are not rejected; a client that registers the same
    /// subscription twice is pruned twice once the endpoint dies. When the
    /// registry is disabled this is a logged no-op.
    pub fn add(&self, record: PushSubscriptionRecord) {
        match &self.inner {
            Some(active) => {
                debug!(id = %record.id, "push subscription stored");
                active.subscriptions.write().unwrap().push(record);
            }
            None => debug!("push disabled, dropping subscription"),
        }
    }

    /// Attempts delivery to every stored subscription, independently.
    ///
    /// Endpoints classified gone are pruned; transient failures are logged
    /// and kept. This never returns an error: the caller (a fire-and-forget
    /// task spawned off the creation path) only logs the summary.
    pub async fn broadcast(&self, title: &str, body: &str, data: serde_json::Value) {
        let Some(active) = &self.inner else {
            debug!("push disabled, skipping broadcast");
            return;
        };

        let targets: Vec<PushSubscriptionRecord> =
            active.subscriptions.read().unwrap().clone();
        if targets.is_empty() {
            return;
        }

        let payload = PushPayload::new(title, body, data);

        let attempts = targets.iter().map(|record| {
            let payload = &payload;
            let transport = &active.transport;
            async move {
                let outcome = transport.deliver(record, payload).await;
                (record, outcome)
            }
        });

        let mut gone: Vec<PushSubscriptionRecord> = Vec::new();
        let mut delivered = 0u64;

        for (record, outcome) in futures::future::join_all(attempts).await {
            match outcome {
                Ok(()) => delivered += 1,
                Err(err) if err.is_gone() => {
                    debug!(id = %record.id, %err, "pruning dead push subscription");
                    gone.push(record.clone());
                }
                Err(err) => {
                    warn!(id = %record.id, %err, "push delivery failed, keeping subscription");
                }
            }
        }

        if !gone.is_empty() {
            let mut subscriptions = active.subscriptions.write().unwrap();
            subscriptions.retain(|record| !gone.contains(record));
            active.pruned.fetch_add(gone.len() as u64, Ordering::Relaxed);
        }
        active.delivered.fetch_add(delivered, Ordering::Relaxed);

        debug!(
            delivered,
            pruned = gone.len(),
            remaining = self.len(),
            "push broadcast finished"
        );
    }

    /// Returns delivery statistics.
    pub fn stats(&self) -> PushStats {
        match &self.inner {
            Some(active) => PushStats {
                enabled: true,
                subscriptions: self.len() as u64,
                delivered: active.delivered.load(Ordering::Relaxed),
                pruned: active.pruned.load(Ordering::Relaxed),
            },
            None => PushStats::default(),
        }
    }
}

/// Push delivery statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct PushStats {
    pub enabled: bool,
    pub subscriptions: u64,
    pub delivered: u64,
    pub pruned: u64,
}

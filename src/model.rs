//! Core Data Model
//!
//! This module defines the records EmberMark stores and ships over the wire:
//! marks (the ephemeral map points) and push subscriptions (the endpoints we
//! notify when a mark appears).
//!
//! ## Wire Format
//!
//! All types serialize to the camelCase JSON shape the web client expects:
//!
//! ```json
//! {
//!   "id": "5f0e…",
//!   "lat": 49.0,
//!   "lng": 28.0,
//!   "color": "blue",
//!   "street": "Soborna Street 12",
//!   "createdAt": "2026-08-23T10:00:00Z",
//!   "expiresAt": "2026-08-23T10:30:00Z"
//! }
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How long a mark stays alive. Fixed for the whole process.
pub const MARK_TTL_SECONDS: i64 = 30 * 60;

/// The color of a mark. Exactly three values exist; anything else is
/// rejected at the API boundary by serde.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkColor {
    Blue,
    Green,
    Split,
}

impl MarkColor {
    /// Human-readable name, used in push notification bodies.
    pub fn display_name(&self) -> &'static str {
        match self {
            MarkColor::Blue => "Blue",
            MarkColor::Green => "Green",
            MarkColor::Split => "Split",
        }
    }
}

/// An ephemeral, location-tagged mark.
///
/// Marks are immutable once created: they are never updated, only removed
/// when their TTL runs out. The invariant `expires_at == created_at + TTL`
/// holds for every mark in the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mark {
    /// Opaque unique identifier (uuid v4), generated fresh per creation
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub color: MarkColor,
    /// Optional human-readable location label from reverse geocoding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Mark {
    /// Creates a new mark with a fresh id, expiring exactly
    /// [`MARK_TTL_SECONDS`] after `created_at`.
    pub fn new(
        lat: f64,
        lng: f64,
        color: MarkColor,
        street: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            lat,
            lng,
            color,
            street,
            created_at,
            expires_at: created_at + Duration::seconds(MARK_TTL_SECONDS),
        }
    }

    /// The expiry instant as epoch milliseconds, used as the score in the
    /// expiry index.
    #[inline]
    pub fn expires_at_ms(&self) -> i64 {
        self.expires_at.timestamp_millis()
    }
}

/// The key material a browser hands out with a push subscription.
/// Opaque to us; forwarded verbatim to the push transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// A registered push endpoint.
///
/// Created on subscribe, removed only when delivery to it is classified as
/// permanently gone. Equality is full-record equality; a client registering
/// the identical subscription twice simply ends up in the set twice, and
/// both copies are pruned together once the endpoint dies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscriptionRecord {
    pub id: String,
    pub endpoint: String,
    pub keys: SubscriptionKeys,
    pub created_at: DateTime<Utc>,
}

impl PushSubscriptionRecord {
    /// Creates a record with a fresh id for the given endpoint and keys.
    pub fn new(endpoint: String, keys: SubscriptionKeys, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            endpoint,
            keys,
            created_at,
        }
    }
}

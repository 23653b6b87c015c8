//! # EmberMark - An Ephemeral Map-Mark Service
//!
//! EmberMark keeps short-lived, colored marks on a map. Every mark lives
//! exactly 30 minutes; creations and expirations are streamed to connected
//! clients over a websocket, and disconnected clients get a best-effort web
//! push notification.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                             EmberMark                             │
//! │                                                                   │
//! │  ┌────────────┐   ┌──────────────┐    ┌───────────────────────┐   │
//! │  │ HTTP API   │──>│  MarkStore   │    │        Fanout         │   │
//! │  │ (axum)     │   │ records +    │    │  (tokio::broadcast)   │   │
//! │  │            │   │ expiry index │    └──────────┬────────────┘   │
//! │  └─────┬──────┘   └──────▲───────┘               │                │
//! │        │                 │                       ▼                │
//! │        │          ┌──────┴────────┐     ┌─────────────────┐       │
//! │        │          │ ExpirySweeper │────>│ /ws subscribers │       │
//! │        │          │ (10s ticks)   │     └─────────────────┘       │
//! │        │          └───────────────┘                               │
//! │        ▼                                                          │
//! │  ┌──────────────┐        ┌──────────────────────┐                 │
//! │  │ GeoEnrichment│        │    PushRegistry      │                 │
//! │  │ (best-effort)│        │ (fire-and-forget     │                 │
//! │  └──────────────┘        │  delivery + pruning) │                 │
//! │                          └──────────────────────┘                 │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle of a Mark
//!
//! 1. `POST /marks` validates the payload and (tolerantly) reverse-geocodes
//!    a street label.
//! 2. The mark lands in the store and the expiry index, then a
//!    `mark.created` event goes out on the fanout.
//! 3. A push broadcast is spawned fire-and-forget; the request has already
//!    returned by the time it runs.
//! 4. 30 minutes later a sweeper tick removes the mark from both structures
//!    and emits `mark.expired`.
//!
//! ## Consistency Notes
//!
//! - The record map and the expiry index are two writes; the gap between
//!   them is an accepted drift window, not a transaction.
//! - `GET /marks` may briefly include a mark whose expiry just passed; the
//!   staleness is bounded by the sweep interval.
//! - Delivery is at-most-once everywhere: no event replay, no push retries.
//!
//! ## Module Overview
//!
//! - [`model`]: mark and subscription records, TTL arithmetic
//! - [`store`]: thread-safe mark store, expiry index, and sweeper
//! - [`events`]: broadcast fanout for realtime subscribers
//! - [`push`]: push subscription registry and best-effort delivery
//! - [`geocode`]: optional reverse-geocoding enrichment
//! - [`http`]: REST API and the websocket channel

pub mod events;
pub mod geocode;
pub mod http;
pub mod model;
pub mod push;
pub mod store;

// Re-export commonly used types for convenience
pub use events::{Event, Fanout};
pub use model::{Mark, MarkColor, PushSubscriptionRecord};
pub use push::{PushRegistry, VapidConfig};
pub use store::{start_expiry_sweeper, ExpirySweeper, MarkStore, SweeperConfig};

/// The default port EmberMark listens on
pub const DEFAULT_PORT: u16 = 8080;

/// The default host EmberMark binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of EmberMark
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

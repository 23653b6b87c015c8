//! Mark Storage Module
//!
//! This module owns the lifecycle of mark records: a thread-safe store with
//! an explicit expiry index, and the background sweeper that reconciles the
//! index against the wall clock.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  MarkStore                   │
//! │   record shards        expiry index          │
//! │   (id → Mark)          ((ms, id) sorted)     │
//! └──────────────────────────────────────────────┘
//!                      ▲
//!                      │ take_expired(now, batch)
//!        ┌─────────────┴─────────────┐
//!        │       ExpirySweeper       │
//!        │   (background tokio task) │──▶ mark.expired events
//!        └───────────────────────────┘
//! ```
//!
//! The store and the index are one logical entity: callers interact only
//! through [`MarkStore`] operations and never see the index itself.

pub mod marks;
pub mod sweeper;

// Re-export commonly used types
pub use marks::{MarkStore, StoreStats, ACTIVE_QUERY_LIMIT};
pub use sweeper::{start_expiry_sweeper, ExpirySweeper, SweeperConfig};

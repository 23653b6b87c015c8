//! Background Expiry Sweeper
//!
//! Marks carry an absolute expiry instant, but nothing fires when that
//! instant passes. The sweeper is the reconciliation loop: every tick it
//! asks the store for entries whose expiry is at or before the wall clock,
//! removes them from both the index and the record map, and announces each
//! removal on the fanout so connected clients drop the mark immediately.
//!
//! ## Tick Behavior
//!
//! 1. Take at most [`SweeperConfig::batch_limit`] expired entries.
//! 2. If none, go back to sleep.
//! 3. Emit one `mark.expired` event per removed id.
//!
//! Ticks run sequentially on a single task, so a slow pass delays the next
//! tick instead of overlapping it. Entries that miss a batch simply ride
//! along on the following tick; nothing in the loop can terminate it short
//! of shutdown.

use crate::events::{Event, Fanout};
use crate::store::MarkStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Interval between sweep ticks (default: 10s)
    pub interval: Duration,

    /// Maximum entries removed per tick, to avoid large bursts (default: 1000)
    pub batch_limit: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            batch_limit: 1000,
        }
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task stops.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts the sweeper as a background task.
    ///
    /// # Returns
    ///
    /// Returns a handle that stops the sweeper when dropped. The process
    /// shutdown path is the only cancellation the loop has.
    pub fn start(store: Arc<MarkStore>, fanout: Fanout, config: SweeperConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(store, fanout, config, shutdown_rx));

        info!("expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Stops the sweeper. Called automatically on drop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        info!("expiry sweeper stopped");
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main sweeper loop.
async fn sweeper_loop(
    store: Arc<MarkStore>,
    fanout: Fanout,
    config: SweeperConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        sweep_once(&store, &fanout, config.batch_limit);
    }
}

/// A single reconciliation pass. Removal and emission are both idempotent
/// from the caller's perspective: re-running over the same instant finds
/// nothing left to do.
fn sweep_once(store: &MarkStore, fanout: &Fanout, batch_limit: usize) {
    let now = Utc::now();
    let removed = store.take_expired(now, batch_limit);

    if removed.is_empty() {
        trace!("sweep tick found nothing expired");
        return;
    }

    debug!(
        removed = removed.len(),
        remaining = store.len(),
        "expired marks swept"
    );

    for id in removed {
        fanout.publish(Event::MarkExpired { id });
    }
}

/// Starts the sweeper with default configuration.
///
/// Convenience for the common bootstrap path.
pub fn start_expiry_sweeper(store: Arc<MarkStore>, fanout: Fanout) -> ExpirySweeper {
    ExpirySweeper::start(store, fanout, SweeperConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mark, MarkColor, MARK_TTL_SECONDS};
    use chrono::Duration as ChronoDuration;

    fn expired_mark() -> Mark {
        // Created long enough ago that its TTL has already run out.
        let created = Utc::now() - ChronoDuration::seconds(MARK_TTL_SECONDS + 5);
        Mark::new(49.0, 28.0, MarkColor::Blue, None, created)
    }

    #[test]
    fn sweep_removes_and_emits_per_id() {
        let store = MarkStore::new();
        let fanout = Fanout::new();
        let mut stream = fanout.subscribe();

        let dead = expired_mark();
        let dead_id = dead.id.clone();
        let alive = Mark::new(1.0, 2.0, MarkColor::Green, None, Utc::now());
        store.put(dead);
        store.put(alive.clone());

        sweep_once(&store, &fanout, 1000);

        // Only the live mark remains, and exactly one event was emitted.
        let active = store.get_active(Utc::now(), 100);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, alive.id);

        assert_eq!(stream.try_next(), Some(Event::MarkExpired { id: dead_id }));
        assert!(stream.try_next().is_none());
    }

    #[test]
    fn sweep_with_nothing_expired_is_quiet() {
        let store = MarkStore::new();
        let fanout = Fanout::new();
        let mut stream = fanout.subscribe();

        store.put(Mark::new(1.0, 2.0, MarkColor::Blue, None, Utc::now()));
        sweep_once(&store, &fanout, 1000);

        assert_eq!(store.len(), 1);
        assert!(stream.try_next().is_none());
    }

    #[test]
    fn leftover_batch_is_picked_up_by_the_next_tick() {
        let store = MarkStore::new();
        let fanout = Fanout::new();

        for _ in 0..7 {
            store.put(expired_mark());
        }

        sweep_once(&store, &fanout, 5);
        assert_eq!(store.len(), 2);

        sweep_once(&store, &fanout, 5);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn background_sweeper_clears_expired_marks() {
        let store = Arc::new(MarkStore::new());
        let fanout = Fanout::new();
        let mut stream = fanout.subscribe();

        store.put(expired_mark());

        let config = SweeperConfig {
            interval: Duration::from_millis(10),
            batch_limit: 1000,
        };
        let _sweeper = ExpirySweeper::start(Arc::clone(&store), fanout.clone(), config);

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(store.is_empty());
        assert!(matches!(stream.next().await, Some(Event::MarkExpired { .. })));
    }

    #[tokio::test]
    async fn sweeper_stops_on_drop() {
        let store = Arc::new(MarkStore::new());
        let fanout = Fanout::new();

        let config = SweeperConfig {
            interval: Duration::from_millis(10),
            batch_limit: 1000,
        };

        {
            let _sweeper = ExpirySweeper::start(Arc::clone(&store), fanout.clone(), config);
            tokio::time::sleep(Duration::from_millis(30)).await;
            // Sweeper is dropped here
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        store.put(expired_mark());
        tokio::time::sleep(Duration::from_millis(50)).await;

        // No sweeper is running, so the expired mark stays put.
        assert_eq!(store.len(), 1);
    }
}

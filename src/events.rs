//! Realtime Event Fanout
//!
//! Creation and expiration of marks are broadcast to every connected
//! realtime client. The bus is a thin wrapper over `tokio::sync::broadcast`
//! with a bounded buffer: publishing never blocks, and a slow consumer that
//! falls behind skips ahead rather than stalling anyone else.
//!
//! There is deliberately no event history. A client connecting after events
//! occurred pulls a fresh snapshot via the active-marks query and merges
//! incoming events idempotently by mark id; the snapshot/subscribe race is
//! accepted.

use crate::model::Mark;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default broadcast buffer size.
const DEFAULT_CAPACITY: usize = 256;

/// Events surfaced to realtime subscribers. Exactly two kinds exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum Event {
    /// A mark was created and is now active.
    #[serde(rename = "mark.created")]
    MarkCreated { mark: Mark },
    /// A mark's TTL ran out and it was removed.
    #[serde(rename = "mark.expired")]
    MarkExpired { id: String },
}

impl Event {
    /// Machine-friendly discriminator, matching the wire tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::MarkCreated { .. } => "mark.created",
            Event::MarkExpired { .. } => "mark.expired",
        }
    }
}

/// Shared broadcast bus. Cheap to clone; all clones publish into and
/// subscribe to the same channel.
#[derive(Debug, Clone)]
pub struct Fanout {
    sender: broadcast::Sender<Event>,
}

impl Fanout {
    /// Creates a bus with the given broadcast capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a bus with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Publishes an event to all current subscribers.
    ///
    /// Having no subscribers is not an error; the event is simply dropped.
    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    /// Subscribes to events published from this point on.
    pub fn subscribe(&self) -> EventStream {
        EventStream {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber's view of the bus.
pub struct EventStream {
    receiver: broadcast::Receiver<Event>,
}

impl EventStream {
    /// Receives the next event, or `None` once the bus is gone.
    ///
    /// A receiver that lagged behind the buffer skips the dropped events
    /// and resumes with the next live one.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "realtime subscriber lagged, skipping ahead");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`next`](Self::next): returns the next
    /// buffered event if one is already waiting.
    pub fn try_next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "realtime subscriber lagged, skipping ahead");
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MarkColor;
    use chrono::Utc;

    #[tokio::test]
    async fn subscribers_see_published_events() {
        let fanout = Fanout::new();
        let mut a = fanout.subscribe();
        let mut b = fanout.subscribe();

        let mark = Mark::new(49.0, 28.0, MarkColor::Blue, None, Utc::now());
        fanout.publish(Event::MarkCreated { mark: mark.clone() });
        fanout.publish(Event::MarkExpired { id: mark.id.clone() });

        assert_eq!(a.next().await, Some(Event::MarkCreated { mark: mark.clone() }));
        assert_eq!(b.next().await, Some(Event::MarkCreated { mark: mark.clone() }));
        assert_eq!(a.next().await, Some(Event::MarkExpired { id: mark.id.clone() }));
        assert_eq!(b.next().await, Some(Event::MarkExpired { id: mark.id }));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let fanout = Fanout::new();
        fanout.publish(Event::MarkExpired { id: "gone".into() });
        assert_eq!(fanout.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn late_subscriber_gets_no_replay() {
        let fanout = Fanout::new();
        fanout.publish(Event::MarkExpired { id: "before".into() });

        let mut stream = fanout.subscribe();
        fanout.publish(Event::MarkExpired { id: "after".into() });

        assert_eq!(stream.next().await, Some(Event::MarkExpired { id: "after".into() }));
    }

    #[test]
    fn events_serialize_with_dotted_tags() {
        let event = Event::MarkExpired { id: "abc".into() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "mark.expired");
        assert_eq!(json["id"], "abc");
        assert_eq!(event.kind(), "mark.expired");

        let mark = Mark::new(1.0, 2.0, MarkColor::Green, None, Utc::now());
        let created = Event::MarkCreated { mark };
        let json = serde_json::to_value(&created).unwrap();
        assert_eq!(json["event"], "mark.created");
        assert!(json["mark"]["id"].is_string());
    }
}

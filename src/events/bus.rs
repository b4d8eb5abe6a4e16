//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from multiple sources (reaper, forwarder,
//! coordinator, supervisor).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                    Subscriber (one):
//!   Reaper      ──┐
//!   Forwarder   ──┼──────► Bus ───────► listener ────► SubscriberSet
//!   Coordinator ──┤  (broadcast chan)  (in Supervisor)
//!   Supervisor  ──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active subscribers at send time.
//! - **Close on drop**: once every `Bus` clone is dropped, receivers drain the
//!   buffer and then observe `RecvError::Closed`. The supervisor relies on this
//!   to flush subscribers at the end of a session.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active subscribers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_receivers_see_events_then_close() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(Event::new(EventKind::MainStarted).with_pid(10));
        bus.publish(Event::new(EventKind::AllReaped));
        drop(bus);

        assert_eq!(rx.recv().await.unwrap().kind, EventKind::MainStarted);
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::AllReaped);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}

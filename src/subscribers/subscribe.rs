//! # The subscriber trait
//!
//! Anything that wants to watch a session (the built-in log writer, a metrics
//! exporter, a test recorder) implements [`Subscribe`] and is handed to
//! [`SupervisorBuilder::with_subscriber`](crate::SupervisorBuilder::with_subscriber).
//!
//! Subscribers run on their own worker task behind a bounded queue, so they
//! may be slow without delaying reaping. Events that do not fit in the queue
//! are dropped for that subscriber and counted; the count is logged when the
//! session ends.
//!
//! ## Example
//! ```rust
//! use std::sync::Mutex;
//! use procvisor::{Event, EventKind, Subscribe};
//!
//! #[derive(Default)]
//! struct Adoptions(Mutex<Vec<i32>>);
//!
//! #[async_trait::async_trait]
//! impl Subscribe for Adoptions {
//!     async fn on_event(&self, ev: &Event) {
//!         if let (Some(pid), Ok(mut seen)) = (ev.pid, self.0.lock()) {
//!             seen.push(pid);
//!         }
//!     }
//!
//!     fn accepts(&self, kind: EventKind) -> bool {
//!         kind == EventKind::ChildAdopted
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "adoptions"
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

/// Receives the events of a session.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Whether events of `kind` should be queued for this subscriber at all.
    fn accepts(&self, _kind: EventKind) -> bool {
        true
    }

    /// Name used in log lines about this subscriber.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue capacity; a session rarely produces more than a few hundred events.
    fn queue_capacity(&self) -> usize {
        256
    }
}

//! # SubscriberSet: hands each session event to every subscriber.
//!
//! The supervisor's listener calls [`SubscriberSet::emit`] for every event it
//! takes off the bus. Each subscriber owns a bounded queue and a worker task,
//! so a slow or panicking subscriber never holds up the reaper, the signal
//! forwarder or the other subscribers.
//!
//! ```text
//!   emit(&Event) ── accepts(kind)? ──► [queue] ─► worker ─► on_event()
//!        │          (per subscriber)     full: dropped += 1
//!        └─ one Arc<Event> shared by every queue
//!
//!   shutdown(): close queues ─► await workers ─► warn on dropped > 0
//! ```
//!
//! Order is preserved per subscriber, not across subscribers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::events::Event;
use crate::logging::RUN;

use super::Subscribe;

struct Worker {
    sub: Arc<dyn Subscribe>,
    queue: mpsc::Sender<Arc<Event>>,
    task: JoinHandle<()>,
    dropped: AtomicU64,
}

impl Worker {
    fn spawn(sub: Arc<dyn Subscribe>) -> Self {
        let (queue, mut rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
        let task = {
            let sub = Arc::clone(&sub);
            tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let handled = std::panic::AssertUnwindSafe(sub.on_event(&ev))
                        .catch_unwind()
                        .await;
                    if handled.is_err() {
                        error!(
                            target: RUN,
                            subscriber = sub.name(),
                            seq = ev.seq,
                            "subscriber panicked"
                        );
                    }
                }
            })
        };
        Self {
            sub,
            queue,
            task,
            dropped: AtomicU64::new(0),
        }
    }

    fn offer(&self, ev: &Arc<Event>) {
        if !self.sub.accepts(ev.kind) {
            return;
        }
        match self.queue.try_send(Arc::clone(ev)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Subscribers of one session, each behind its own queue.
pub struct SubscriberSet {
    workers: Vec<Worker>,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber. Needs a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>) -> Self {
        Self {
            workers: subs.into_iter().map(Worker::spawn).collect(),
        }
    }

    /// Queues `event` for every subscriber that accepts its kind.
    ///
    /// Never waits: a full queue drops the event for that subscriber only.
    pub fn emit(&self, event: &Event) {
        let ev = Arc::new(event.clone());
        for worker in &self.workers {
            worker.offer(&ev);
        }
    }

    /// Closes every queue and waits until the workers handled what was queued.
    pub async fn shutdown(self) {
        for worker in self.workers {
            let Worker {
                sub,
                queue,
                task,
                dropped,
            } = worker;
            drop(queue);
            if let Err(e) = task.await {
                error!(target: RUN, subscriber = sub.name(), "subscriber worker failed: {e}");
            }
            let dropped = dropped.into_inner();
            if dropped > 0 {
                warn!(target: RUN, subscriber = sub.name(), dropped, "subscriber missed events");
            }
        }
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// True without subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

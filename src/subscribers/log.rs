//! # LogWriter: renders runtime events as log lines
//!
//! A subscriber that turns incoming [`Event`]s into `tracing` events under the
//! `run` target. Lines under the `reaper` target (main exit, adoptions, reap
//! failures) are written by the reaper itself as it reaps, so the writer does
//! not accept those kinds. With the [`TabFormat`](crate::logging::TabFormat)
//! formatter installed by [`logging::init`](crate::logging::init) the output is:
//!
//! ## Example output
//! ```text
//! INFO run: main started\tpid=4711\tprogram=sh
//! INFO reaper: adopted\tpid=4713\treparented=4710\tcode=0
//! INFO reaper: main exited\tpid=4711\tcode=0
//! INFO run: signal received\tsignal=SIGINT
//! WARN run: kill escalated\tpid=4711\tsignal=SIGKILL
//! ERROR run: drain incomplete\tcount=1\tstuck=4790
//! ```

use async_trait::async_trait;
use nix::sys::signal::Signal;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::logging::RUN;
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let signal = e.signal().map(Signal::as_str);
        let reason = e.reason.as_deref();

        match e.kind {
            EventKind::SubreaperEnabled => {
                debug!(target: RUN, reparented = e.reparented, "subreaper enabled");
            }
            EventKind::SubreaperUnavailable => {
                warn!(target: RUN, reason, "subreaper unavailable, orphans will not be adopted");
            }
            EventKind::MainStarted => {
                info!(target: RUN, pid = e.pid, program = reason, "main started");
            }
            EventKind::TimeoutHit => {
                warn!(target: RUN, pid = e.pid, "timeout");
            }
            EventKind::SignalReceived => {
                info!(target: RUN, signal, "signal received");
            }
            EventKind::SignalForwarded => {
                debug!(target: RUN, pid = e.pid, signal, "signal forwarded");
            }
            EventKind::KillEscalated => {
                warn!(target: RUN, pid = e.pid, signal, "kill escalated");
            }
            EventKind::DrainStarted => {
                debug!(target: RUN, count = e.count, "drain started");
            }
            EventKind::DescendantSignaled => {
                debug!(target: RUN, pid = e.pid, signal, "descendant signaled");
            }
            EventKind::AllReaped => {
                debug!(target: RUN, "all descendants reaped");
            }
            EventKind::DrainIncomplete => {
                error!(target: RUN, count = e.count, stuck = reason, "drain incomplete");
            }
            EventKind::SessionDone => {
                debug!(target: RUN, code = e.code, "session done");
            }
            EventKind::MainExited | EventKind::ChildAdopted | EventKind::ReapFailed => {}
        }
    }

    fn accepts(&self, kind: EventKind) -> bool {
        !matches!(
            kind,
            EventKind::MainExited | EventKind::ChildAdopted | EventKind::ReapFailed
        )
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reaper_kinds_are_left_to_the_reaper() {
        let w = LogWriter::new();
        assert!(!w.accepts(EventKind::ChildAdopted));
        assert!(!w.accepts(EventKind::MainExited));
        assert!(!w.accepts(EventKind::ReapFailed));
        assert!(w.accepts(EventKind::MainStarted));
        assert!(w.accepts(EventKind::DrainIncomplete));
    }
}

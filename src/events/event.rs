//! # Runtime events emitted by the supervisor, reaper and signal forwarder.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Session events**: subreaper setup, main process start/exit, timeout
//! - **Reaper events**: adoption of orphans, wait failures
//! - **Signal events**: received, forwarded, escalated
//! - **Shutdown events**: phase changes of the shutdown coordinator
//!
//! The [`Event`] struct carries the metadata (pid, signal, exit code...).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use procvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ChildAdopted)
//!     .with_pid(4242)
//!     .with_reparented(17)
//!     .with_code(0);
//!
//! assert_eq!(ev.kind, EventKind::ChildAdopted);
//! assert_eq!(ev.pid, Some(4242));
//! assert_eq!(ev.reparented, Some(17));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use nix::sys::signal::Signal;

use crate::core::ProcessExit;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Session events ===
    /// Subreaper mode is active; orphans will be reparented to the supervisor.
    ///
    /// Sets: `reparented` (supervisor pid)
    SubreaperEnabled,

    /// Subreaper mode could not be enabled (or the platform lacks it).
    ///
    /// Sets: `reason`
    SubreaperUnavailable,

    /// The target command was started.
    ///
    /// Sets: `pid` (main pid), `reason` (program)
    MainStarted,

    /// The main process was reaped.
    ///
    /// Sets: `pid`, `code` or `signal`
    MainExited,

    /// The main process outlived `Config::timeout`.
    ///
    /// Sets: `pid`
    TimeoutHit,

    // === Reaper events ===
    /// An orphaned descendant was reaped by the supervisor.
    ///
    /// Sets: `pid`, `reparented` (supervisor pid), `parent_before` (if known),
    /// `code` or `signal`
    ChildAdopted,

    /// A `waitpid` pass failed.
    ///
    /// Sets: `attempt`, `reason`
    ReapFailed,

    // === Signal events ===
    /// The supervisor received a terminating signal.
    ///
    /// Sets: `signal`
    SignalReceived,

    /// A signal was relayed to the main process (group).
    ///
    /// Sets: `pid`, `signal`
    SignalForwarded,

    /// The main process did not exit within grace and was killed.
    ///
    /// Sets: `pid`, `signal`
    KillEscalated,

    // === Shutdown events ===
    /// Draining started: remaining descendants are being terminated.
    ///
    /// Sets: `count` (live adopted descendants known at that time)
    DrainStarted,

    /// A remaining descendant was sent a termination signal.
    ///
    /// Sets: `pid`, `signal`
    DescendantSignaled,

    /// Every descendant was reaped.
    AllReaped,

    /// Draining gave up on descendants that would not die.
    ///
    /// Sets: `count`, `reason` (stuck pids)
    DrainIncomplete,

    /// The session finished.
    ///
    /// Sets: `code` (supervisor exit code)
    SessionDone,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Process id the event is about.
    pub pid: Option<i32>,
    /// Pid of the process that adopted `pid` (the supervisor).
    pub reparented: Option<i32>,
    /// Best-effort parent of `pid` before it was reparented.
    pub parent_before: Option<i32>,
    /// Signal number.
    pub signal: Option<i32>,
    /// Exit code.
    pub code: Option<i32>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Number of processes concerned.
    pub count: Option<usize>,
    /// Human-readable reason (errors, program name, stuck pids...).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            pid: None,
            reparented: None,
            parent_before: None,
            signal: None,
            code: None,
            attempt: None,
            count: None,
            reason: None,
        }
    }

    /// Attaches a process id.
    #[inline]
    pub fn with_pid(mut self, pid: i32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches the adopting process id.
    #[inline]
    pub fn with_reparented(mut self, pid: i32) -> Self {
        self.reparented = Some(pid);
        self
    }

    /// Attaches the previous parent, when known.
    #[inline]
    pub fn with_parent_before(mut self, pid: Option<i32>) -> Self {
        self.parent_before = pid;
        self
    }

    /// Attaches a signal.
    #[inline]
    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = Some(signal as i32);
        self
    }

    /// Attaches an exit code.
    #[inline]
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Attaches an exit code or terminating signal, whichever `exit` carries.
    #[inline]
    pub fn with_exit(mut self, exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Exited(code) => self.code = Some(code),
            ProcessExit::Signaled(sig) => self.signal = Some(sig as i32),
        }
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a process count.
    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(n);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Signal as a typed value, if the number is a known signal.
    pub fn signal(&self) -> Option<Signal> {
        self.signal.and_then(|n| Signal::try_from(n).ok())
    }

    /// True for the events the reaper subsystem emits.
    #[inline]
    pub fn is_reaper_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ChildAdopted | EventKind::MainExited | EventKind::ReapFailed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let a = Event::new(EventKind::AllReaped);
        let b = Event::new(EventKind::AllReaped);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_with_exit_sets_code_or_signal() {
        let ev = Event::new(EventKind::MainExited).with_exit(ProcessExit::Exited(3));
        assert_eq!(ev.code, Some(3));
        assert_eq!(ev.signal, None);

        let ev =
            Event::new(EventKind::MainExited).with_exit(ProcessExit::Signaled(Signal::SIGKILL));
        assert_eq!(ev.code, None);
        assert_eq!(ev.signal(), Some(Signal::SIGKILL));
    }

    #[test]
    fn test_reaper_events() {
        assert!(Event::new(EventKind::ChildAdopted).is_reaper_event());
        assert!(Event::new(EventKind::MainExited).is_reaper_event());
        assert!(!Event::new(EventKind::SignalForwarded).is_reaper_event());
    }
}

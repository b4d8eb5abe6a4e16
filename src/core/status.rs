//! # Exit statuses and the session report.
//!
//! [`ProcessExit`] is what the reaper learns from `waitpid` about one process.
//! [`SessionReport`] is what a finished session hands back to the caller, and
//! [`SessionReport::exit_code`] maps it to the supervisor's own exit code:
//!
//! ```text
//! timed out (and timeout is a failure)  → 124
//! supervisor got a terminating signal   → 128 + that signal
//! main killed by a signal               → 128 + that signal
//! main exited                           → its exit code
//! main status unknown                   → 1
//! ```

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Exited with a code.
    Exited(i32),
    /// Terminated by a signal.
    Signaled(Signal),
}

impl ProcessExit {
    /// Splits a terminal `waitpid` status into pid and exit; `None` for
    /// non-terminal statuses (stopped, continued, still alive).
    pub fn from_wait(status: WaitStatus) -> Option<(Pid, ProcessExit)> {
        match status {
            WaitStatus::Exited(pid, code) => Some((pid, ProcessExit::Exited(code))),
            WaitStatus::Signaled(pid, sig, _core) => Some((pid, ProcessExit::Signaled(sig))),
            _ => None,
        }
    }

    /// Exit code, if the process exited normally.
    pub fn code(&self) -> Option<i32> {
        match self {
            ProcessExit::Exited(code) => Some(*code),
            ProcessExit::Signaled(_) => None,
        }
    }

    /// Terminating signal, if any.
    pub fn signal(&self) -> Option<Signal> {
        match self {
            ProcessExit::Exited(_) => None,
            ProcessExit::Signaled(sig) => Some(*sig),
        }
    }

    /// True for `Exited(0)`.
    pub fn success(&self) -> bool {
        matches!(self, ProcessExit::Exited(0))
    }
}

/// Why the session ended the way it did, beyond the main status itself.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExitReasons {
    /// Main outlived `Config::timeout`.
    pub timed_out: bool,
    /// First terminating signal the supervisor itself received.
    pub self_signaled: Option<Signal>,
    /// Main had to be SIGKILLed after its grace period.
    pub killed: bool,
    /// Draining gave up on at least one descendant.
    pub degraded: bool,
}

/// Outcome of one supervised session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Pid of the main process.
    pub main_pid: Pid,
    /// How main ended; `None` if its status was lost.
    pub status: Option<ProcessExit>,
    /// Extra circumstances.
    pub reasons: ExitReasons,
    /// Every pid that was logged as adopted, in reap order.
    pub adopted: Vec<Pid>,
    /// Descendants still alive when draining gave up.
    pub stuck: Vec<Pid>,
    /// Treat a timeout as success.
    pub timeout_is_ok: bool,
}

impl SessionReport {
    /// Supervisor exit code for this session.
    pub fn exit_code(&self) -> u8 {
        if self.reasons.timed_out {
            return if self.timeout_is_ok { 0 } else { 124 };
        }
        if let Some(sig) = self.reasons.self_signaled {
            return signal_code(sig);
        }
        match self.status {
            Some(ProcessExit::Signaled(sig)) => signal_code(sig),
            Some(ProcessExit::Exited(code)) => (code & 0xff) as u8,
            None => 1,
        }
    }

    /// True when the supervisor exits with status 0.
    pub fn success(&self) -> bool {
        self.exit_code() == 0
    }
}

fn signal_code(sig: Signal) -> u8 {
    (128 + sig as i32).min(255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: Option<ProcessExit>) -> SessionReport {
        SessionReport {
            main_pid: Pid::from_raw(100),
            status,
            reasons: ExitReasons::default(),
            adopted: Vec::new(),
            stuck: Vec::new(),
            timeout_is_ok: false,
        }
    }

    #[test]
    fn test_main_code_is_propagated_verbatim() {
        for code in [0, 1, 3, 42, 255] {
            assert_eq!(report(Some(ProcessExit::Exited(code))).exit_code(), code as u8);
        }
    }

    #[test]
    fn test_signaled_main_maps_to_128_plus_signal() {
        let r = report(Some(ProcessExit::Signaled(Signal::SIGKILL)));
        assert_eq!(r.exit_code(), 137);
        let r = report(Some(ProcessExit::Signaled(Signal::SIGTERM)));
        assert_eq!(r.exit_code(), 143);
    }

    #[test]
    fn test_self_signal_wins_over_main_status() {
        let mut r = report(Some(ProcessExit::Exited(0)));
        r.reasons.self_signaled = Some(Signal::SIGINT);
        assert_eq!(r.exit_code(), 130);
        assert!(!r.success());
    }

    #[test]
    fn test_timeout() {
        let mut r = report(Some(ProcessExit::Signaled(Signal::SIGTERM)));
        r.reasons.timed_out = true;
        assert_eq!(r.exit_code(), 124);
        r.timeout_is_ok = true;
        assert_eq!(r.exit_code(), 0);
    }

    #[test]
    fn test_unknown_status_fails() {
        assert_eq!(report(None).exit_code(), 1);
    }

    #[test]
    fn test_from_wait() {
        let pid = Pid::from_raw(7);
        assert_eq!(
            ProcessExit::from_wait(WaitStatus::Exited(pid, 2)),
            Some((pid, ProcessExit::Exited(2)))
        );
        assert_eq!(
            ProcessExit::from_wait(WaitStatus::Signaled(pid, Signal::SIGTERM, false)),
            Some((pid, ProcessExit::Signaled(Signal::SIGTERM)))
        );
        assert_eq!(ProcessExit::from_wait(WaitStatus::StillAlive), None);
        assert_eq!(ProcessExit::from_wait(WaitStatus::Continued(pid)), None);
    }
}

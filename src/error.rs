//! Error types used by the procvisor runtime.
//!
//! - [`RuntimeError`]: what [`Supervisor::run`](crate::Supervisor::run) returns when a
//!   session cannot start.
//! - [`LaunchError`]: the target command could not be started (fatal).
//! - [`HookError`]: a pre-launch `--wait` hook failed (fatal).
//! - [`SubreaperError`]: subreaper mode could not be enabled (degraded, non-fatal).
//! - [`WaitError`]: collecting exit statuses failed (logged, retried, degraded).
//! - [`SignalError`]: delivering a signal failed (gone targets are ignored).
//!
//! Every type provides `as_label` (stable snake_case, for logs) and `as_message`.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// # Errors that abort a session before the target command runs.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The target command could not be started.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// A pre-launch hook failed.
    #[error(transparent)]
    Hook(#[from] HookError),

    /// Registering a signal handler failed.
    #[error("failed to register signal handlers: {0}")]
    SignalSetup(#[source] io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use procvisor::{LaunchError, RuntimeError};
    ///
    /// let err = RuntimeError::from(LaunchError::NotFound { program: "nope".into() });
    /// assert_eq!(err.as_label(), "launch_not_found");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Launch(e) => e.as_label(),
            RuntimeError::Hook(e) => e.as_label(),
            RuntimeError::SignalSetup(_) => "runtime_signal_setup",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::Launch(e) => e.as_message(),
            RuntimeError::Hook(e) => e.as_message(),
            RuntimeError::SignalSetup(e) => format!("signal setup: {e}"),
        }
    }

    /// Exit code the `run` binary reports for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            RuntimeError::Launch(e) => e.exit_code(),
            RuntimeError::Hook(_) | RuntimeError::SignalSetup(_) => 125,
        }
    }
}

/// # Errors produced while starting the target command.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LaunchError {
    /// The program does not exist (or is not on `PATH`).
    #[error("command not found: {}", program.to_string_lossy())]
    NotFound {
        /// Program as given on the command line.
        program: OsString,
    },

    /// The program exists but may not be executed by this user.
    #[error("permission denied: {}", program.to_string_lossy())]
    PermissionDenied {
        /// Program as given on the command line.
        program: OsString,
    },

    /// The file is not in an executable format.
    #[error("not executable: {}", program.to_string_lossy())]
    NotExecutable {
        /// Program as given on the command line.
        program: OsString,
    },

    /// Any other spawn failure.
    #[error("failed to spawn {}: {source}", program.to_string_lossy())]
    Io {
        /// Program as given on the command line.
        program: OsString,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
}

impl LaunchError {
    /// Classifies a spawn error for `program`.
    pub fn from_io(program: impl Into<OsString>, source: io::Error) -> Self {
        let program = program.into();
        if source.raw_os_error() == Some(Errno::ENOEXEC as i32) {
            return LaunchError::NotExecutable { program };
        }
        match source.kind() {
            io::ErrorKind::NotFound => LaunchError::NotFound { program },
            io::ErrorKind::PermissionDenied => LaunchError::PermissionDenied { program },
            _ => LaunchError::Io { program, source },
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            LaunchError::NotFound { .. } => "launch_not_found",
            LaunchError::PermissionDenied { .. } => "launch_permission_denied",
            LaunchError::NotExecutable { .. } => "launch_not_executable",
            LaunchError::Io { .. } => "launch_io",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }

    /// Shell-compatible exit code: 127 not found, 126 not runnable, 125 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            LaunchError::NotFound { .. } => 127,
            LaunchError::PermissionDenied { .. } | LaunchError::NotExecutable { .. } => 126,
            LaunchError::Io { .. } => 125,
        }
    }
}

/// # Errors produced by pre-launch hooks.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum HookError {
    /// An error marker (`<path>.err`) showed up while waiting for `<path>`.
    #[error("found an error file at {}", .0.display())]
    FoundErrFile(PathBuf),

    /// Filesystem access failed.
    #[error("hook i/o: {0}")]
    Io(#[from] io::Error),
}

impl HookError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            HookError::FoundErrFile(_) => "hook_found_err_file",
            HookError::Io(_) => "hook_io",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

/// # Errors produced while enabling subreaper mode.
///
/// Never fatal: the supervisor still manages its direct child, it only loses
/// the ability to adopt orphaned grandchildren.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubreaperError {
    /// `prctl(PR_SET_CHILD_SUBREAPER)` (or its read-back) failed.
    #[error("prctl failed: {0}")]
    Prctl(Errno),

    /// The call succeeded but the attribute reads back as unset.
    #[error("child subreaper attribute was not applied")]
    NotApplied,
}

impl SubreaperError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SubreaperError::Prctl(_) => "subreaper_prctl",
            SubreaperError::NotApplied => "subreaper_not_applied",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

/// # Errors produced while collecting child exit statuses.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// `waitpid` failed with something other than `ECHILD`/`EINTR`.
    #[error("waitpid failed: {0}")]
    Os(Errno),

    /// The bounded retry budget ran out.
    #[error("waitpid kept failing after {attempts} attempts (last: {last})")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The last error observed.
        last: Errno,
    },
}

impl WaitError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            WaitError::Os(_) => "wait_os",
            WaitError::RetriesExhausted { .. } => "wait_retries_exhausted",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

/// # Errors produced while delivering a signal.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalError {
    /// The target no longer exists (`ESRCH`).
    #[error("target already exited")]
    Gone,

    /// Not allowed to signal the target (`EPERM`).
    #[error("permission denied")]
    Denied,

    /// Any other failure.
    #[error("kill failed: {0}")]
    Os(Errno),
}

impl SignalError {
    /// Maps an errno from `kill(2)`/`killpg(3)`.
    pub fn from_errno(errno: Errno) -> Self {
        match errno {
            Errno::ESRCH => SignalError::Gone,
            Errno::EPERM => SignalError::Denied,
            other => SignalError::Os(other),
        }
    }

    /// `true` when the target simply exited first; callers ignore these.
    ///
    /// # Example
    /// ```
    /// use procvisor::SignalError;
    ///
    /// assert!(SignalError::Gone.is_race_lost());
    /// assert!(!SignalError::Denied.is_race_lost());
    /// ```
    pub fn is_race_lost(&self) -> bool {
        matches!(self, SignalError::Gone)
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SignalError::Gone => "signal_gone",
            SignalError::Denied => "signal_denied",
            SignalError::Os(_) => "signal_os",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

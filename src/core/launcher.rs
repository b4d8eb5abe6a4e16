//! # Starting the target command.
//!
//! [`CommandSpec`] describes what to run; [`spawn`] starts it as a direct child
//! and returns a [`Handle`] with the main pid and a channel that resolves
//! once the reaper collects the main exit status.
//!
//! ## Rules
//! - The `std::process::Child` is dropped right after spawning and never
//!   waited on: the reaper is the only `waitpid` caller in the process.
//! - Main becomes the leader of a new process group unless disabled, so
//!   signals can reach everything it starts in the foreground.
//! - The environment is cleared; only allowlisted variables are passed.
//! - stdin and stdout are inherited. stderr is inherited too, unless the
//!   spec asks for it to be relayed: it is then piped and handed back on
//!   [`Handle::stderr`].
//!
//! ```text
//!   spawn(spec) ──► fork/exec ──► Handle { pid, exited: oneshot::Receiver }
//!                                               ▲
//!                         Reaper ── ExitNotifier┘ (on waitpid(main))
//! ```

use std::ffi::{OsStr, OsString};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{ChildStderr, Command, Stdio};

use nix::unistd::Pid;
use tokio::sync::oneshot;

use crate::core::ProcessExit;
use crate::error::LaunchError;

/// What to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path (resolved through `PATH`).
    pub program: OsString,
    /// Arguments after the program.
    pub args: Vec<OsString>,
    /// Environment variables passed through; everything else is dropped.
    pub env_allowlist: Vec<String>,
    /// Files that must exist before launching.
    pub wait_on: Vec<PathBuf>,
    /// Marker file written once the session is over.
    pub on_exit: Option<PathBuf>,
    /// Pipe stderr so it can be relayed as log lines.
    pub relay_stderr: bool,
}

impl CommandSpec {
    /// Creates a spec running `program` without arguments.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env_allowlist: Vec::new(),
            wait_on: Vec::new(),
            on_exit: None,
            relay_stderr: false,
        }
    }

    /// Appends arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Passes the given variables through to the command.
    pub fn with_env_allowlist<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env_allowlist.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Pipes stderr instead of inheriting it.
    pub fn with_stderr_relay(mut self) -> Self {
        self.relay_stderr = true;
        self
    }

    /// Adds a file to wait for before launching.
    pub fn with_wait_on(mut self, path: impl Into<PathBuf>) -> Self {
        self.wait_on.push(path.into());
        self
    }

    /// Sets the exit marker file.
    pub fn with_on_exit(mut self, path: impl Into<PathBuf>) -> Self {
        self.on_exit = Some(path.into());
        self
    }

    /// Program name, for logs.
    pub fn program_lossy(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    fn command(&self, own_group: bool) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        cmd.env_clear();
        cmd.envs(std::env::vars_os().filter(|(key, _)| allowed(&self.env_allowlist, key)));
        if self.relay_stderr {
            cmd.stderr(Stdio::piped());
        }
        if own_group {
            cmd.process_group(0);
        }
        cmd
    }
}

fn allowed(keys: &[String], key: &OsStr) -> bool {
    keys.iter().any(|k| OsStr::new(k) == key)
}

/// A running main process.
#[derive(Debug)]
pub struct Handle {
    /// Pid of the main process (also its process group id when grouped).
    pub pid: Pid,
    /// Resolves with the main exit status once it is reaped.
    ///
    /// Closes without a value if the status was lost (reaper failure).
    pub exited: oneshot::Receiver<ProcessExit>,
    /// Read end of main's stderr when relaying was requested.
    pub stderr: Option<ChildStderr>,
}

/// Reaper side of [`Handle::exited`].
#[derive(Debug)]
pub struct ExitNotifier(oneshot::Sender<ProcessExit>);

impl ExitNotifier {
    /// Creates a notifier and the receiver it resolves.
    pub(crate) fn channel() -> (Self, oneshot::Receiver<ProcessExit>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    /// Delivers the main exit status; a dropped receiver is ignored.
    pub fn notify(self, exit: ProcessExit) {
        let _ = self.0.send(exit);
    }
}

/// Starts `spec` as a direct child of the current process.
///
/// Subreaper mode and the SIGCHLD handler must be in place before calling
/// this, see [`Supervisor::run`](crate::Supervisor::run).
pub fn spawn(spec: &CommandSpec, own_group: bool) -> Result<(Handle, ExitNotifier), LaunchError> {
    let mut child = spec
        .command(own_group)
        .spawn()
        .map_err(|e| LaunchError::from_io(spec.program.clone(), e))?;

    let pid = Pid::from_raw(child.id() as i32);
    let stderr = child.stderr.take();
    drop(child);

    let (notifier, exited) = ExitNotifier::channel();
    let handle = Handle {
        pid,
        exited,
        stderr,
    };
    Ok((handle, notifier))
}

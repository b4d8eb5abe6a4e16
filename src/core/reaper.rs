//! # Reaper: collects every exited descendant of the supervisor.
//!
//! The [`Reaper`] runs as one tokio task for the whole session. It is the only
//! code in the process that calls `waitpid`, and the only owner of the
//! [`Descendants`] set.
//!
//! ## Architecture
//! ```text
//!  SIGCHLD stream ──┐
//!                   ├──► Reaper::run ── drain(): waitpid(-1, WNOHANG) until StillAlive/ECHILD
//!  ReaperClient ────┘         │             ├─ main    → MainExited, ExitNotifier, main_gone.cancel()
//!   (Census request)          │             └─ adopted → ChildAdopted{pid, reparented}
//!                             │
//!                             └──► Census { running, exhausted } ──► Coordinator
//! ```
//!
//! ## Rules
//! - SIGCHLD is coalesced by the kernel: every wakeup drains all reapable children.
//! - `EINTR` retries at once; other errors are published as `ReapFailed` and
//!   retried with [`BackoffPolicy`] delays, up to `reap_retries` times per pass.
//!   Running out marks the session degraded; the next wakeup tries again.
//! - An adoption event is published before the pid leaves the set.
//! - `reaper` log lines (main exit, adoptions, failures) are written here with
//!   `tracing` directly rather than through the bus, so a burst of exits larger
//!   than the bus capacity still yields exactly one line per adopted pid.
//! - On cancellation a final drain runs before the report is returned.

use std::time::Duration;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use tokio::signal::unix::Signal as SignalStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::descendants::{Descendants, Reaped};
use crate::core::launcher::ExitNotifier;
use crate::core::{ProcessExit, sys};
use crate::error::WaitError;
use crate::events::{Bus, Event, EventKind};
use crate::logging::REAPER;
use crate::policies::BackoffPolicy;

/// Reply to a census request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Census {
    /// Adopted descendants still running, sorted by pid.
    pub running: Vec<Pid>,
    /// `waitpid` reported `ECHILD`: the supervisor has no children left.
    pub exhausted: bool,
}

/// What the reaper saw during the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaperReport {
    /// Adopted pids in reap order.
    pub adopted: Vec<Pid>,
    /// Number of reaped processes, main included.
    pub reaped: usize,
    /// At least one reap pass ran out of retries.
    pub degraded: bool,
}

enum ReaperCommand {
    Census { reply: oneshot::Sender<Census> },
}

/// Coordinator side of the reaper.
#[derive(Clone, Debug)]
pub struct ReaperClient {
    tx: mpsc::Sender<ReaperCommand>,
}

impl ReaperClient {
    /// Asks the reaper to drain and report the live descendants.
    ///
    /// `None` once the reaper has stopped.
    pub async fn census(&self) -> Option<Census> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(ReaperCommand::Census { reply }).await.ok()?;
        rx.await.ok()
    }
}

/// Where the coordinator gets its census from.
#[async_trait]
pub trait CensusSource: Send + Sync {
    /// Drains, then reports the live descendants; `None` once unavailable.
    async fn census(&self) -> Option<Census>;
}

#[async_trait]
impl CensusSource for ReaperClient {
    async fn census(&self) -> Option<Census> {
        ReaperClient::census(self).await
    }
}

impl std::fmt::Debug for ReaperCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaperCommand::Census { .. } => f.write_str("Census"),
        }
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drained {
    /// Children remain but none is reapable right now.
    Pending,
    /// No children left.
    Exhausted,
    /// `waitpid` kept failing.
    Failed,
}

/// Reaper tuning.
#[derive(Debug, Clone, Copy)]
pub struct ReaperParams {
    /// Retries per failing pass.
    pub retries: u32,
    /// Delays between retries.
    pub backoff: BackoffPolicy,
}

/// The reaper actor. See the module docs.
pub struct Reaper {
    set: Descendants,
    notifier: Option<ExitNotifier>,
    main_gone: CancellationToken,
    sigchld: SignalStream,
    commands: mpsc::Receiver<ReaperCommand>,
    params: ReaperParams,
    bus: Bus,
    self_pid: Pid,
    degraded: bool,
}

impl Reaper {
    /// Creates the reaper for a session whose main process is `main`.
    ///
    /// `sigchld` must have been registered before main was launched.
    /// `main_gone` is cancelled as soon as main is reaped.
    pub fn new(
        main: Pid,
        notifier: ExitNotifier,
        main_gone: CancellationToken,
        sigchld: SignalStream,
        params: ReaperParams,
        bus: Bus,
    ) -> (Self, ReaperClient) {
        let (tx, commands) = mpsc::channel(8);
        let reaper = Self {
            set: Descendants::new(main),
            notifier: Some(notifier),
            main_gone,
            sigchld,
            commands,
            params,
            bus,
            self_pid: sys::self_pid(),
            degraded: false,
        };
        (reaper, ReaperClient { tx })
    }

    /// Runs until `token` is cancelled or the SIGCHLD stream ends.
    pub async fn run(mut self, token: CancellationToken) -> ReaperReport {
        self.drain().await;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                Some(cmd) = self.commands.recv() => self.serve(cmd).await,
                wake = self.sigchld.recv() => {
                    if wake.is_none() {
                        break;
                    }
                    self.drain().await;
                }
            }
        }

        self.drain().await;
        ReaperReport {
            adopted: self.set.adopted().to_vec(),
            reaped: self.set.reaped(),
            degraded: self.degraded,
        }
    }

    async fn serve(&mut self, cmd: ReaperCommand) {
        match cmd {
            ReaperCommand::Census { reply } => {
                let census = self.census().await;
                let _ = reply.send(census);
            }
        }
    }

    async fn census(&mut self) -> Census {
        if self.drain().await == Drained::Exhausted {
            return Census {
                running: Vec::new(),
                exhausted: true,
            };
        }

        let children = sys::live_children();
        for pid in &children {
            self.set.observe_running(*pid);
        }
        self.set.retain_children(&children);
        Census {
            running: self.set.running_adopted(),
            exhausted: false,
        }
    }

    /// Reaps every child that has already exited.
    async fn drain(&mut self) -> Drained {
        let mut failures = 0u32;
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => return Drained::Pending,
                Ok(status) => {
                    if let Some((pid, exit)) = ProcessExit::from_wait(status) {
                        self.on_reaped(pid, exit);
                    }
                }
                Err(Errno::ECHILD) => return Drained::Exhausted,
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    failures += 1;
                    match self.wait_failed(failures, errno) {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => return Drained::Failed,
                    }
                }
            }
        }
    }

    /// Records failure number `failures` of the current pass. Returns the
    /// delay before the next attempt, or `None` once retries are used up.
    fn wait_failed(&mut self, failures: u32, errno: Errno) -> Option<Duration> {
        let exhausted = failures > self.params.retries;
        let err = if exhausted {
            WaitError::RetriesExhausted {
                attempts: failures,
                last: errno,
            }
        } else {
            WaitError::Os(errno)
        };
        let reason = err.as_message();
        warn!(
            target: REAPER,
            attempt = failures,
            error = err.as_label(),
            reason = %reason,
            "reap failed"
        );
        self.bus.publish(
            Event::new(EventKind::ReapFailed)
                .with_attempt(failures)
                .with_reason(reason),
        );

        if exhausted {
            self.degraded = true;
            None
        } else {
            Some(self.params.backoff.next(failures - 1))
        }
    }

    fn on_reaped(&mut self, pid: Pid, exit: ProcessExit) {
        match self.set.mark_exited(pid) {
            Reaped::Main => {
                info!(
                    target: REAPER,
                    pid = pid.as_raw(),
                    code = exit.code(),
                    signal = exit.signal().map(Signal::as_str),
                    "main exited"
                );
                self.bus.publish(
                    Event::new(EventKind::MainExited)
                        .with_pid(pid.as_raw())
                        .with_exit(exit),
                );
                if let Some(notifier) = self.notifier.take() {
                    notifier.notify(exit);
                }
                self.main_gone.cancel();
            }
            Reaped::Adopted { parent_at_adoption } => {
                info!(
                    target: REAPER,
                    pid = pid.as_raw(),
                    reparented = self.self_pid.as_raw(),
                    parent_before = parent_at_adoption.map(Pid::as_raw),
                    code = exit.code(),
                    signal = exit.signal().map(Signal::as_str),
                    "adopted"
                );
                self.bus.publish(
                    Event::new(EventKind::ChildAdopted)
                        .with_pid(pid.as_raw())
                        .with_reparented(self.self_pid.as_raw())
                        .with_parent_before(parent_at_adoption.map(Pid::as_raw))
                        .with_exit(exit),
                );
            }
        }
        self.set.forget(pid);
    }
}

//! # Supervisor: runs one command as a subreaper session.
//!
//! The [`Supervisor`] owns the session configuration and the subscribers. Each
//! call to [`Supervisor::run`] wires a fresh [`Bus`], reaper, signal forwarder
//! and coordinator around the launched command and tears them down in order.
//!
//! ## Key responsibilities
//! - subscribe to the [`Bus`] and **fan-out** events via [`SubscriberSet`]
//! - enable subreaper mode and register signal handlers **before** launching
//! - hand main's exit and every terminating signal to the coordinator
//! - flush subscribers before returning the [`SessionReport`]
//!
//! ## High-level architecture
//! ```text
//! run(CommandSpec):
//!   listener:  Bus.subscribe() ─► SubscriberSet::emit(&Event)       (until the bus closes)
//!   subreaper::enable()          ─► SubreaperEnabled | SubreaperUnavailable
//!   hooks::wait_for(spec.wait_on)
//!   signal(SIGCHLD), TerminationSignals::register()
//!   launcher::spawn(spec)        ─► MainStarted
//!   stderr relay (optional)      ─► one `run` log line per stderr line
//!
//!   ┌──────────── tokio::spawn ───────────┐   ┌────── tokio::spawn ──────┐
//!   │ Reaper::run(reaper_token)           │   │ SignalForwarder::run     │
//!   │  waitpid ─► MainExited/ChildAdopted │   │  relay ─► main group     │
//!   └──────┬───────────────▲──────────────┘   └──────────┬───────────────┘
//!          │ ExitNotifier  │ Census                      │ Signal
//!          ▼               │                             ▼
//!        Coordinator::run(handle.exited) ◄───────────────┘
//!          └─► Outcome
//!
//!   cancel forwarder + reaper, await both ─► ReaperReport
//!   await the stderr relay for at most drain_grace
//!   hooks::on_exit(spec.on_exit, success)
//!   SessionDone{code}, drop bus ─► listener drains ─► SubscriberSet::shutdown()
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use procvisor::{CommandSpec, Config, Supervisor};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sup = Supervisor::builder(Config::default()).build();
//!     let spec = CommandSpec::new("sh").with_args(["-c", "sleep 1 & exit 0"]);
//!
//!     let report = sup.run(spec).await?;
//!     std::process::exit(report.exit_code().into());
//! }
//! ```

use std::sync::Arc;

use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::coordinator::{Coordinator, main_target};
use crate::core::launcher::{self, CommandSpec};
use crate::core::reaper::{Reaper, ReaperParams, ReaperReport};
use crate::core::signals::{SignalForwarder, TerminationSignals};
use crate::core::{Config, SessionReport, hooks, subreaper, sys};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::logging::RUN;
use crate::subscribers::{Subscribe, SubscriberSet};

use super::builder::SupervisorBuilder;

/// Runs commands under subreaper supervision and reports how they ended.
pub struct Supervisor {
    /// Session configuration.
    pub cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl Supervisor {
    /// Creates a supervisor with the given config and subscribers.
    pub fn new(cfg: Config, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        Self { cfg, subscribers }
    }

    /// Returns a builder.
    pub fn builder(cfg: Config) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    /// Runs `spec` to completion: launch, supervise, drain, report.
    ///
    /// Errors are returned only when the command could not be started; every
    /// session that launched ends with a [`SessionReport`]. Subscribers have
    /// seen every event of the session when this returns.
    pub async fn run(&self, spec: CommandSpec) -> Result<SessionReport, RuntimeError> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let listener = self.subscriber_listener(&bus);

        let result = self.session(&bus, &spec).await;
        match &result {
            Ok(report) => bus.publish(
                Event::new(EventKind::SessionDone).with_code(i32::from(report.exit_code())),
            ),
            Err(e) => error!(target: RUN, error = e.as_label(), "{}", e.as_message()),
        }

        drop(bus);
        if let Err(e) = listener.await {
            warn!(target: RUN, "subscriber listener failed: {e}");
        }
        result
    }

    /// Subscribes to the bus and forwards events to a fresh subscriber set
    /// until every publisher is gone, then flushes the set.
    fn subscriber_listener(&self, bus: &Bus) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        let set = SubscriberSet::new(self.subscribers.clone());
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(n)) => {
                        warn!(target: RUN, skipped = n, "subscriber listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            set.shutdown().await;
        })
    }

    async fn session(&self, bus: &Bus, spec: &CommandSpec) -> Result<SessionReport, RuntimeError> {
        self.enable_subreaper(bus);
        hooks::wait_for(&spec.wait_on).await?;

        let sigchld = signal(SignalKind::child()).map_err(RuntimeError::SignalSetup)?;
        let signals = TerminationSignals::register().map_err(RuntimeError::SignalSetup)?;

        let (mut handle, notifier) = launcher::spawn(spec, self.cfg.forward_to_group)?;
        let main = handle.pid;
        let relay = handle.stderr.take().and_then(|pipe| relay_stderr(main, pipe));
        bus.publish(
            Event::new(EventKind::MainStarted)
                .with_pid(main.as_raw())
                .with_reason(spec.program_lossy()),
        );

        let main_gone = CancellationToken::new();
        let (reaper, client) = Reaper::new(
            main,
            notifier,
            main_gone.clone(),
            sigchld,
            ReaperParams {
                retries: self.cfg.reap_retries,
                backoff: self.cfg.reap_backoff,
            },
            bus.clone(),
        );
        let reaper_token = CancellationToken::new();
        let reaper_task = tokio::spawn(reaper.run(reaper_token.clone()));

        let (forwarder, signal_rx) = SignalForwarder::new(
            signals,
            main_target(&self.cfg, main),
            main_gone,
            bus.clone(),
        );
        let forwarder_token = CancellationToken::new();
        let forwarder_task = tokio::spawn(forwarder.run(forwarder_token.clone()));

        let coordinator = Coordinator::new(self.cfg.clone(), main, client, signal_rx, bus.clone());
        let outcome = coordinator.run(handle.exited).await;

        forwarder_token.cancel();
        reaper_token.cancel();
        if let Err(e) = forwarder_task.await {
            warn!(target: RUN, "signal forwarder failed: {e}");
        }
        let reaped = reaper_task.await.unwrap_or_else(|e| {
            error!(target: RUN, "reaper failed: {e}");
            ReaperReport {
                degraded: true,
                ..ReaperReport::default()
            }
        });

        if let Some(mut relay) = relay {
            // A stuck descendant may still hold the pipe open.
            if tokio::time::timeout(self.cfg.drain_grace, &mut relay).await.is_err() {
                relay.abort();
            }
        }

        let mut reasons = outcome.reasons;
        reasons.degraded |= reaped.degraded;
        let report = SessionReport {
            main_pid: main,
            status: outcome.status,
            reasons,
            adopted: reaped.adopted,
            stuck: outcome.stuck,
            timeout_is_ok: self.cfg.timeout_is_ok,
        };

        if let Some(path) = &spec.on_exit {
            if let Err(e) = hooks::on_exit(path, report.success()).await {
                error!(
                    target: RUN,
                    path = %path.display(),
                    error = e.as_label(),
                    "failed to write exit marker"
                );
            }
        }
        Ok(report)
    }

    fn enable_subreaper(&self, bus: &Bus) {
        match subreaper::enable() {
            Ok(()) if subreaper::adoption_available() => bus.publish(
                Event::new(EventKind::SubreaperEnabled).with_reparented(sys::self_pid().as_raw()),
            ),
            Ok(()) => bus.publish(
                Event::new(EventKind::SubreaperUnavailable).with_reason("unsupported platform"),
            ),
            Err(e) => bus.publish(
                Event::new(EventKind::SubreaperUnavailable).with_reason(e.as_message()),
            ),
        }
    }
}

/// Logs every line main writes to stderr until the pipe closes.
fn relay_stderr(main: Pid, pipe: std::process::ChildStderr) -> Option<JoinHandle<()>> {
    let pipe = match tokio::process::ChildStderr::from_std(pipe) {
        Ok(pipe) => pipe,
        Err(e) => {
            warn!(target: RUN, "cannot relay stderr: {e}");
            return None;
        }
    };
    let pid = main.as_raw();
    Some(tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => info!(target: RUN, pid, "{line}"),
                Ok(None) => break,
                Err(e) => {
                    warn!(target: RUN, pid, "stderr relay stopped: {e}");
                    break;
                }
            }
        }
    }))
}

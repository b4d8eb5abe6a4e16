//! # procvisor
//!
//! **procvisor** supervises one command as a Linux *subreaper*: it launches the
//! command, adopts every descendant orphaned along the way, relays terminating
//! signals, and does not return before every descendant has been reaped or
//! killed. The `run` binary is a thin CLI over [`Supervisor`].
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                 ┌──────────────────┐
//!                 │   CommandSpec    │
//!                 │ (program, args,  │
//!                 │  env, hooks)     │
//!                 └────────┬─────────┘
//!                          ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor::run (one session)                                    │
//! │  - subreaper::enable()   (PR_SET_CHILD_SUBREAPER, once)           │
//! │  - SIGCHLD + SIGINT/TERM/QUIT/HUP handlers, then launcher::spawn  │
//! │  - Coordinator (Running → MainExited → Draining → Done)           │
//! └──────┬──────────────────────────┬───────────────────────┬─────────┘
//!        ▼                          ▼                       │
//! ┌──────────────────┐      ┌──────────────────┐            │
//! │     Reaper       │      │ SignalForwarder  │            │
//! │ waitpid(-1) loop │      │ relay to main's  │            │
//! │ Descendants set  │      │ process group    │            │
//! └┬─────────────────┘      └┬─────────────────┘            │
//!  │ Publishes:              │ Publishes:                   │ Publishes:
//!  │ - MainExited            │ - SignalReceived             │ - MainStarted, TimeoutHit
//!  │ - ChildAdopted          │ - SignalForwarded            │ - KillEscalated, DrainStarted
//!  │ - ReapFailed            │                              │ - AllReaped, SessionDone ...
//!  ▼                         ▼                              ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │                     (capacity: Config::bus_capacity)              │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber_listener   │
//!                       │   (in Supervisor)      │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                           (per-sub queues)
//!                        ┌──────────┼──────────┐
//!                        ▼          ▼          ▼
//!                    LogWriter    sub2  ...  subN
//! ```
//!
//! ### Lifecycle
//! ```text
//! CommandSpec ──► Supervisor::run()
//!
//!   ├─► wait for hook files (optional)
//!   ├─► spawn main in its own process group
//!   ├─► Running:     signals relayed; timeout → SIGTERM; grace → SIGKILL
//!   ├─► MainExited:  reaper delivered main's status
//!   ├─► Draining:    SIGTERM leftovers, SIGKILL after drain_grace
//!   └─► Done:        write exit marker, SessionDone, flush subscribers
//!
//! SessionReport::exit_code():
//!   timeout 124 | own signal 128+n | main signaled 128+n | main code | unknown 1
//! ```
//!
//! ## Features
//! | Area              | Description                                                    | Key types / traits                       |
//! |-------------------|----------------------------------------------------------------|------------------------------------------|
//! | **Supervision**   | Run one command and clean up its whole process tree.          | [`Supervisor`], [`CommandSpec`]          |
//! | **Subscriber API**| Hook into session events (logging, metrics, tests).           | [`Subscribe`], [`Event`], [`EventKind`]  |
//! | **Policies**      | Retry timing for failing reap passes.                          | [`BackoffPolicy`]                        |
//! | **Errors**        | Typed errors for launch, hooks, waits and signals.             | [`RuntimeError`], [`LaunchError`]        |
//! | **Configuration** | Grace periods, timeout, signal policy.                         | [`Config`]                               |
//! | **Logging**       | `tracing` setup with the tab-separated line format.            | [`logging::init`], [`logging::TabFormat`]|
//!
//! ## Optional features
//! - `logging` (default): exports the built-in [`LogWriter`] subscriber.
//!
//! ## Example
//! ```rust,no_run
//! use procvisor::{CommandSpec, Config, Supervisor};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     procvisor::logging::init(procvisor::logging::ENV_VAR)?;
//!
//!     let sup = Supervisor::builder(Config::default())
//!         .with_log_writer()
//!         .build();
//!
//!     let spec = CommandSpec::new("sh").with_args(["-c", "sleep 5 & exit 0"]);
//!     let report = sup.run(spec).await?;
//!     assert_eq!(report.adopted.len(), 1);
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod policies;
mod subscribers;

pub mod logging;

// ---- Public re-exports ----

pub use crate::core::{
    Census, CommandSpec, Config, Descendant, ExitReasons, Handle, Outcome, Phase, ProcessExit,
    ReaperReport, Role, SessionReport, State, Supervisor, SupervisorBuilder, Target, hooks,
    subreaper,
};
pub use error::{HookError, LaunchError, RuntimeError, SignalError, SubreaperError, WaitError};
pub use events::{Bus, Event, EventKind};
pub use policies::BackoffPolicy;
pub use subscribers::{Subscribe, SubscriberSet};

// Built-in logger subscriber.
// Enabled by default; disable with `--no-default-features`.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;

//! Runtime core: supervision of one process tree.
//!
//! The public entry point is [`Supervisor`]; the other modules are the pieces
//! it wires together for each session.
//!
//! Internal modules:
//! - [`subreaper`]: process-wide subreaper mode;
//! - [`launcher`]: starts the target command;
//! - [`hooks`]: marker files before launch and after the session;
//! - [`reaper`]: the only `waitpid` caller, owner of the descendant set;
//! - [`signals`]: relays terminating signals to main;
//! - [`coordinator`]: state machine from launch to teardown;
//! - [`descendants`]: bookkeeping of main and adopted processes;
//! - [`sys`]: signal delivery and `/proc` helpers.

mod builder;
mod config;
mod coordinator;
mod descendants;
pub mod hooks;
mod launcher;
mod reaper;
mod signals;
mod status;
pub mod subreaper;
mod supervisor;
mod sys;

pub use builder::SupervisorBuilder;
pub use config::Config;
pub use coordinator::{Outcome, Phase};
pub use descendants::{Descendant, Role, State};
pub use launcher::{CommandSpec, Handle};
pub use reaper::{Census, ReaperReport};
pub use status::{ExitReasons, ProcessExit, SessionReport};
pub use supervisor::Supervisor;
pub use sys::Target;

//! `run`: launch a command as a subreaper and clean up its whole process tree.
//!
//! ```text
//! run [OPTIONS] <PROGRAM> [ARGS]...
//! ```
//!
//! Exits with the command's status (see [`SessionReport::exit_code`]).
//! Logging is controlled with `RUN_LOG`, e.g. `RUN_LOG=run=debug,reaper=info`.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitCode, Termination};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use procvisor::{CommandSpec, Config, RuntimeError, SessionReport, Supervisor, logging};

#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "run", version, about)]
struct Cli {
    /// Terminate the command if it still runs after this long (e.g. `30s`, `5m`).
    #[arg(
        long,
        alias = "timeout.duration",
        value_name = "DURATION",
        value_parser = humantime::parse_duration,
        env = "RUN_TIMEOUT"
    )]
    timeout: Option<Duration>,

    /// Exit with status 0 when the timeout is hit.
    #[arg(long, alias = "timeout.is-not-failure")]
    timeout_is_not_failure: bool,

    /// Time the command gets to exit after a forwarded signal or the timeout.
    #[arg(
        long,
        value_name = "DURATION",
        value_parser = humantime::parse_duration,
        env = "RUN_GRACE"
    )]
    grace: Option<Duration>,

    /// Time leftover descendants get between SIGTERM and SIGKILL.
    #[arg(
        long,
        value_name = "DURATION",
        value_parser = humantime::parse_duration,
        env = "RUN_DRAIN_GRACE"
    )]
    drain_grace: Option<Duration>,

    /// Signal only the command itself, not its process group.
    #[arg(long)]
    no_process_group: bool,

    /// Pass this environment variable to the command (repeatable); others are dropped.
    #[arg(long = "env", value_name = "KEY")]
    envs: Vec<String>,

    /// Log each line the command writes to stderr under the `run` target.
    #[arg(long)]
    relay_stderr: bool,

    /// Wait for this file to exist before launching (repeatable).
    #[arg(long = "wait", value_name = "PATH")]
    wait_on: Vec<PathBuf>,

    /// Create this file when the command succeeded, its `.err` marker otherwise.
    #[arg(long, value_name = "PATH")]
    on_exit: Option<PathBuf>,

    /// The program to run.
    #[arg(required = true)]
    program: OsString,

    /// Arguments passed to the program.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<OsString>,
}

impl Cli {
    fn config(&self) -> Config {
        let mut cfg = Config::default();
        if let Some(timeout) = self.timeout {
            cfg.timeout = timeout;
        }
        if let Some(grace) = self.grace {
            cfg.grace = grace;
        }
        if let Some(drain_grace) = self.drain_grace {
            cfg.drain_grace = drain_grace;
        }
        cfg.timeout_is_ok = self.timeout_is_not_failure;
        cfg.forward_to_group = !self.no_process_group;
        cfg
    }

    fn command(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(self.program.clone())
            .with_args(self.args.iter().cloned())
            .with_env_allowlist(self.envs.iter().cloned());
        if self.relay_stderr {
            spec = spec.with_stderr_relay();
        }
        for path in &self.wait_on {
            spec = spec.with_wait_on(path.clone());
        }
        if let Some(path) = &self.on_exit {
            spec = spec.with_on_exit(path.clone());
        }
        spec
    }
}

/// Maps the session outcome to the process exit status.
struct Exit(anyhow::Result<SessionReport>);

impl Termination for Exit {
    fn report(self) -> ExitCode {
        match self.0 {
            Ok(report) => ExitCode::from(report.exit_code()),
            Err(cause) => match cause.downcast_ref::<RuntimeError>() {
                Some(err) => ExitCode::from(err.exit_code()),
                None => {
                    eprintln!("run: {cause:#}");
                    ExitCode::FAILURE
                }
            },
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Exit {
    Exit(run(Cli::parse()).await)
}

async fn run(cli: Cli) -> anyhow::Result<SessionReport> {
    logging::init(logging::ENV_VAR).context("failed to install the log subscriber")?;

    let sup = Supervisor::builder(cli.config()).with_log_writer().build();

    let report = sup.run(cli.command()).await?;
    Ok(report)
}

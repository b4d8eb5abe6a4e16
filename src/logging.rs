//! # Logging backend
//!
//! Every component logs through `tracing` with one of two explicit targets:
//! - [`RUN`]: supervisor control logic (launch, signals, shutdown);
//! - [`REAPER`]: the reaper subsystem (adoptions, exits, wait failures).
//!
//! [`init`] installs a subscriber that filters per target from an environment
//! variable (`RUN_LOG=run=trace,reaper=info`) and writes one line per event to
//! stderr in the tab-separated shape produced by [`TabFormat`]:
//!
//! ```text
//! <LEVEL> <target>: <message>\t<key>=<value>\t<key>=<value>...
//! ```
//!
//! Consumers split a line on `\t`, then each segment after the first on `=`.
//! Tabs and newlines inside values are replaced by spaces so the shape holds.

use std::fmt::{self, Write as _};

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, prelude::*};

/// Target for supervisor control logic.
pub const RUN: &str = "run";

/// Target for the reaper subsystem.
pub const REAPER: &str = "reaper";

/// Environment variable the `run` binary reads its filter from.
pub const ENV_VAR: &str = "RUN_LOG";

/// Filter used when the variable is unset or invalid.
pub const DEFAULT_FILTER: &str = "warn";

/// Installs the global subscriber: `EnvFilter` from `var` + [`TabFormat`] on stderr.
pub fn init(var: &str) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_env(var).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(TabFormat)
                .with_writer(std::io::stderr),
        )
        .try_init()
}

/// Line formatter producing `<LEVEL> <target>: <message>` followed by `\tkey=value` pairs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TabFormat;

impl<S, N> FormatEvent<S, N> for TabFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let mut fields = TabFields::default();
        event.record(&mut fields);

        write!(writer, "{} {}", meta.level(), meta.target())?;
        if let Some(message) = &fields.message {
            write!(writer, ": {message}")?;
        }
        writer.write_str(&fields.pairs)?;
        writeln!(writer)
    }
}

/// Collects the message and the `\tkey=value` pairs of one event.
#[derive(Default)]
struct TabFields {
    message: Option<String>,
    pairs: String,
}

impl TabFields {
    fn push(&mut self, field: &Field, value: &dyn fmt::Display) {
        let value = sanitize(value.to_string());
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            let _ = write!(self.pairs, "\t{}={}", field.name(), value);
        }
    }
}

impl Visit for TabFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, &value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, &value);
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, &value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, &value);
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, &format_args!("{value:?}"));
    }
}

fn sanitize(value: String) -> String {
    if value.contains(['\t', '\n', '\r']) {
        value.replace(['\t', '\n', '\r'], " ")
    } else {
        value
    }
}

//! Tracing setup for the bridge.
//!
//! The binary calls [`init_journald_or_stdout`] once at startup. Everything
//! else pulls the level macros in with `use crate::tracing::prelude::*`.

use std::env;
use std::fmt;

use time::OffsetDateTime;
use tracing::field::{Field, Visit};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime, FmtContext, FormatEvent, FormatFields},
    prelude::*,
    registry::LookupSpan,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

const CRATE_PREFIX: &str = "iobridge::";

/// Install the global subscriber.
///
/// Under systemd (`JOURNAL_STREAM` set) events go to journald; otherwise
/// they go to stdout, filtered by `RUST_LOG` with INFO as the default.
pub fn init_journald_or_stdout() {
    if env::var("JOURNAL_STREAM").is_ok() {
        match tracing_journald::layer() {
            Ok(layer) => tracing_subscriber::registry().with(layer).init(),
            Err(e) => {
                init_stdout();
                error!(error = %e, "Failed to initialize journald logging, using stdout.");
            }
        }
    } else {
        init_stdout();
    }
}

fn init_stdout() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().event_format(LineFormat))
        .init();
}

/// One event per line: `HH:MM:SS LEVEL target: message key=value ...`.
struct LineFormat;

#[derive(Default)]
struct Fields {
    message: Option<String>,
    pairs: Vec<(&'static str, String)>,
}

impl Visit for Fields {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.pairs.push((field.name(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.pairs.push((field.name(), format!("{:?}", value)));
        }
    }
}

fn short_target(target: &str) -> &str {
    target.strip_prefix(CRATE_PREFIX).unwrap_or(target)
}

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let mut fields = Fields::default();
        event.record(&mut fields);

        LocalTimer.format_time(&mut writer)?;

        let color = writer.has_ansi_escapes();
        let level = *event.metadata().level();
        let label = match level {
            tracing::Level::ERROR => ("\x1b[31m", "ERROR"),
            tracing::Level::WARN => ("\x1b[33m", "WARN "),
            tracing::Level::INFO => ("\x1b[32m", "INFO "),
            tracing::Level::DEBUG => ("\x1b[34m", "DEBUG"),
            tracing::Level::TRACE => ("\x1b[35m", "TRACE"),
        };
        if color {
            write!(writer, " {}{}\x1b[0m ", label.0, label.1)?;
        } else {
            write!(writer, " {} ", label.1)?;
        }

        write!(writer, "{}: ", short_target(event.metadata().target()))?;
        if let Some(message) = &fields.message {
            write!(writer, "{}", message)?;
        }

        for (key, value) in fields.pairs.iter().filter(|(k, _)| !k.starts_with("log.")) {
            write!(writer, " {}={}", key, value)?;
        }
        writeln!(writer)
    }
}

// The stock timer prints a full RFC 3339 UTC timestamp, which is noise when
// following bus traffic. Local time to the second is enough to line events
// up against the master's log.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or(OffsetDateTime::now_utc());
        let stamp = now
            .format(time::macros::format_description!("[hour]:[minute]:[second]"))
            .map_err(|_| fmt::Error)?;
        write!(w, "{}", stamp)
    }
}

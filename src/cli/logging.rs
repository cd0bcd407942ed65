//! Logging setup shared by every binary in this crate. Mirrors the
//! sequencer's `cli::logging` module: a small `LogFormat` enum plus a
//! verbosity count, both wired to a single `tracing_subscriber` layer.

use clap::ValueEnum;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Installs a global `tracing` subscriber. `verbosity` stacks with
/// `RUST_LOG`: 0 leaves the default `info` filter alone, each extra `-v`
/// lowers it by one level down to `trace`.
pub fn init(format: LogFormat, verbosity: u8) {
    let default_directive = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let fmt_layer = match format {
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().pretty().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().flatten_event(true).boxed(),
    };

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
}

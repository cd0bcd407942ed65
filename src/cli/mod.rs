//! Shared CLI scaffolding for this crate's binaries.

pub mod logging;

use std::path::PathBuf;

use clap::Args;

pub use logging::LogFormat;

/// Options shared by every binary: where to read engine configuration from,
/// and how to log.
#[derive(Args, Debug)]
pub struct SharedArgs {
    /// Path to a config file (TOML/JSON/YAML, sniffed by extension). Falls
    /// back to built-in defaults, further overridden by `LAE__*` env vars.
    #[arg(long, env = "LAE_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "compact")]
    pub log_format: LogFormat,

    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

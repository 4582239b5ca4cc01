//! OBD-II Diagnostic Console
//!
//! Command-line front end over the diagnostic link: live monitoring,
//! trouble-code reads and clears, and the vehicle profile catalogue.

pub mod commands;
pub mod config;
pub mod output;

use anyhow::anyhow;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging on stderr.
///
/// `RUST_LOG` wins over `verbosity` (0 = warn, 1 = info, 2+ = debug).
pub fn init_logging(verbosity: u8, json: bool) -> anyhow::Result<()> {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let result = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.map_err(|e| anyhow!("Failed to set tracing subscriber: {}", e))
}

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LogFormat;

/// Resolve the filter directive: `-v` flags win over the configured level.
#[must_use]
pub fn effective_level(configured: &str, verbose: u8) -> &str {
    match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Logs go to stderr; stdout carries results.
///
/// `RUST_LOG`, when set, takes precedence over `level`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => {
            subscriber
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()?;
        }
        LogFormat::Text => {
            subscriber
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()?;
        }
    }

    Ok(())
}

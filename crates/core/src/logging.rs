//! Logging and observability
//!
//! Structured logging setup shared by the `cai` binary and tests.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging system.
///
/// Diagnostics go to stderr so stdout stays clean for `--json` output and
/// passthrough engine invocations.
pub fn init() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    tracing::debug!("Logging initialized");
    Ok(())
}

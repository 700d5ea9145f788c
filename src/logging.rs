// Tracing subscriber setup
use anyhow::{anyhow, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Build the log filter. `RUST_LOG` wins when it is set.
pub fn log_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("ambient_soundboard=debug,warn")
        } else {
            EnvFilter::new("ambient_soundboard=info,warn")
        }
    })
}

/// Initialize the logging system with tracing.
///
/// Fails instead of panicking if a global subscriber is already installed.
pub fn init_logging(verbose: bool) -> Result<()> {
    tracing_subscriber::registry()
        .with(log_filter(verbose))
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

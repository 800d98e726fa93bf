//! Logging initialization for the prompt_search binary.
//!
//! Installs a layered tracing subscriber: an `EnvFilter` honouring `RUST_LOG`
//! (falling back to the requested level) and a compact console `fmt` layer.
//! The library itself never installs a subscriber.

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// # Errors
/// Returns an error if a global subscriber was already installed.
pub fn init_logging(log_level: Level) -> Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

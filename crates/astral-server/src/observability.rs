//! Log output for the server.
//!
//! Logging starts at `info` before the config file is read; the configured
//! level replaces it once known. `RUST_LOG`, when set, wins over both.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::config::LoggingConfig;

const STARTUP_LEVEL: &str = "info";

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_tracing() {
    let (filter, handle) = reload::Layer::new(filter_for(STARTUP_LEVEL));
    if FILTER_HANDLE.set(handle).is_err() {
        return;
    }
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

/// Switch to the level from the loaded configuration.
pub fn apply_logging_level(config: &LoggingConfig) {
    let Some(handle) = FILTER_HANDLE.get() else {
        return;
    };
    if let Err(e) = handle.reload(filter_for(&config.level)) {
        tracing::warn!(error = %e, level = %config.level, "failed to apply log level");
    }
}

pub fn shutdown_tracing() {
    tracing::debug!("tracing shut down");
}

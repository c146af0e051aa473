// src/logging.rs

//! Logging setup for `taskdag` using `tracing` + `tracing-subscriber`.
//!
//! The log level is resolved from the `TASKDAG_LOG` environment variable
//! (e.g. "info", "debug", or any `EnvFilter` directive), defaulting to
//! `info`.
//!
//! Logs are sent to STDERR so that stdout stays free for whatever the
//! embedding driver wants to print.

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialise the global logging subscriber.
///
/// Safe to call once at startup; embedding applications that install their
/// own subscriber should skip this.
pub fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_env("TASKDAG_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Send logs to stderr; keep stdout free for the caller.
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

pub mod builders;

pub use builders::{ExecutionLog, GraphBuilder, ScriptedTask};

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests, at most once per process.
///
/// The level comes from `TASKDAG_LOG` (same convention as
/// `taskdag::logging`), default `info`. Output goes through the test
/// writer, so the harness only shows it for failing tests unless run with
/// `-- --nocapture`:
///
/// `TASKDAG_LOG=debug cargo test -- --nocapture`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("TASKDAG_LOG")
            .unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout, so a scheduling bug shows up as a
/// failed test instead of a hung suite.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("test timed out after 5 seconds")
}

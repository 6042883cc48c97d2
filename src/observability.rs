//! Observability utilities.

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Initialize the tracing subscriber once for the process.
///
/// Output defaults to compact text and switches to JSON via
/// `DWARA_LOG_FORMAT=json`. The filter comes from `RUST_LOG`, defaulting
/// to `info` when unset.
pub fn init_tracing() {
    TRACING_INIT.get_or_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let json = std::env::var("DWARA_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let result = if json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact())
                .try_init()
        };

        // Another subscriber may already be installed by the host app.
        if let Err(err) = result {
            eprintln!("tracing init skipped: {err}");
        }
    });
}

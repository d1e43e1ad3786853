//! Logging initialization

use tracing_subscriber::EnvFilter;

/// Initialize tracing; `RUST_LOG` wins, `info` otherwise
pub fn init_tracing() {
    init_tracing_with_level("info");
}

/// Initialize tracing with a fallback level for when `RUST_LOG` is unset
pub fn init_tracing_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // A subscriber may already be installed (tests, repeated calls)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .try_init();
}

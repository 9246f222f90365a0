//! Logging initialization
//!
//! Embedding applications call `init_logging` once at process start.
//! Filtering follows `RUST_LOG`, defaulting to info for this crate.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber. Safe to call more than once;
/// later calls are ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("supplier_hub=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

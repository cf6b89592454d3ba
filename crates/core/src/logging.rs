//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "info,vista=debug,vista_renderer=debug";

/// Initialize the logging system with tracing.
///
/// Filtering comes from `RUST_LOG` when set, otherwise a default that keeps
/// the renderer at `debug` and everything else at `info`.
///
/// # Example
/// ```no_run
/// vista_core::init_logging();
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging() {
    init_logging_with_filter(DEFAULT_FILTER);
}

/// Initialize logging with an explicit fallback filter.
///
/// `RUST_LOG` still takes precedence. Calling this twice is harmless; the
/// second subscriber is rejected and the first one stays installed.
pub fn init_logging_with_filter(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}

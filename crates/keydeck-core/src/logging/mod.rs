//! Structured logging with `tracing`.
//!
//! The plugin's stdout/stderr are usually captured by the host, so all
//! diagnostics go to stderr through a compact `fmt` layer. Log context for
//! an action instance (action UUID, context) travels in a [`tracing::Span`]
//! built by [`instance_span`].

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at application startup. Subsequent calls are no-ops.
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails if a global subscriber is already set
    let _ = subscriber.try_init();
}

/// Span used as the logger handed to an action instance.
pub fn instance_span(action: &str, context: &str) -> tracing::Span {
    tracing::info_span!("action", action = %action, context = %context)
}

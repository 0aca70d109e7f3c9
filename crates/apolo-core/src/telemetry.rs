//! Tracing subscriber setup for hosts embedding the engine

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber.
///
/// Honors `RUST_LOG`, defaulting to `info`. Calling it more than once is a
/// no-op, so tests and hosts can both call it safely.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

//! Tracing setup for workflow diagnostics.
//!
//! Diagnostics go to stderr through `tracing`; agent transcripts are echoed to
//! stdout by the agent executor and are unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `storyloop=info` so workflow progress is
/// visible without configuration.
///
/// # Example
/// ```bash
/// RUST_LOG=storyloop=debug storyloop ./my-project
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("storyloop=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

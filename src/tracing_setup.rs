//! Logging bootstrap
//!
//! Installs a `tracing` subscriber with an environment-driven filter
//! (`RUST_LOG`, defaulting to `info`) and console formatting. Embedding
//! binaries call this once at startup; the library itself only emits events.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging; safe to call more than once
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

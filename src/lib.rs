pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod heuristics;
pub mod mime;
pub mod models;
pub mod pipeline;
pub mod routing;
pub mod scheduler;
pub mod suppression;
pub mod webhook;

use tracing_subscriber::EnvFilter;

/// Install the process-wide `tracing` subscriber. A library must not do this
/// on its own — the embedding application decides when and how logs are
/// routed — so this is exposed for the binary/service entry point to call
/// once at startup, falling back to `config::default_log_filter` when
/// `RUST_LOG` isn't set.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())))
        .init();
}

//! `tracing` subscriber setup for the binary and for ad-hoc debugging.

use tracing_subscriber::EnvFilter;

pub type InitResult = Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>;

/// Install a formatting subscriber. `RUST_LOG` wins over `default_filter`.
/// Fails if a global subscriber is already set.
pub fn init(default_filter: &str) -> InitResult {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
}

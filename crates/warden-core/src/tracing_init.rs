//! Tracing setup for the warden binaries.
//!
//! One initializer, two output shapes: human-readable lines for a terminal
//! and JSON for log shippers. Filtering follows `RUST_LOG` when set and
//! falls back to the caller's default otherwise.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. Call once, before any span is entered.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

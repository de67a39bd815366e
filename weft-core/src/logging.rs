//! Opt-in structured logging for analysis runs.
//!
//! The traversal code emits `tracing` events (frontier choices, sleep-set
//! rotations, coverage progress); nothing is printed unless a subscriber is
//! installed. `RUST_LOG` overrides the default filter as usual, e.g.
//! `RUST_LOG=weft_explore=trace` to watch the enumerator backtrack.

use tracing::info;
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes logging at `info` level.
pub fn init_analysis_logging() {
    init_analysis_logging_with_level("info");
}

/// Initializes logging at the given level ("trace", "debug", "info", "warn",
/// "error"), unless `RUST_LOG` is set.
pub fn init_analysis_logging_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("weft_core={level},weft_explore={level}").into());

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(filter)
        .init();

    info!(level, "analysis logging initialized");
}

//! Observability: tracing initialisation and metric helpers.

pub mod metrics;

use common::config::ObservabilityConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` (via `config.log_level`) selects what is logged; JSON output
/// is enabled by `LIVE_LOG_JSON`.
///
/// # Errors
///
/// Fails if the filter directive is invalid or a subscriber is already
/// installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), String> {
    let filter = env_filter(&config.log_level)?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };

    result.map_err(|e| format!("Failed to install tracing subscriber: {e}"))
}

fn env_filter(directive: &str) -> Result<EnvFilter, String> {
    EnvFilter::try_new(directive).map_err(|e| format!("Invalid log filter '{directive}': {e}"))
}

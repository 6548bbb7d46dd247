//! Common configuration types for the live signaling crates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default `EnvFilter` directive when `RUST_LOG` is unset.
///
/// Events use dotted targets (`live.broadcaster`, `common.session`), so the
/// directive names those prefixes as well as the crate paths.
pub const DEFAULT_LOG_LEVEL: &str = "live=info,live_signaling=info,common=info";

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directive (e.g. `live=debug`)
    pub log_level: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            json_logs: false,
        }
    }
}

impl ObservabilityConfig {
    /// Read `RUST_LOG` and `LIVE_LOG_JSON` from a variable map.
    #[must_use]
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let log_level = vars
            .get("RUST_LOG")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let json_logs = vars
            .get("LIVE_LOG_JSON")
            .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"));

        Self {
            log_level,
            json_logs,
        }
    }
}

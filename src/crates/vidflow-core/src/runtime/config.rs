//! Runtime configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables the host hands to the supervisor.
///
/// Durations are stored as seconds so a config deserialized from JSON
/// reads naturally; accessors convert to [`Duration`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Target interval between frames for sources that do not pace
    /// themselves. Zero lets sources free-run.
    pub default_source_interval_seconds: f64,
    /// Consecutive transform failures before a worker is treated as fatal.
    pub consecutive_failure_limit: u32,
    /// How long the supervisor waits for workers after cancellation before
    /// aborting them.
    pub shutdown_grace_seconds: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_source_interval_seconds: 1.0 / 30.0,
            consecutive_failure_limit: 16,
            shutdown_grace_seconds: 2.0,
        }
    }
}

impl RuntimeConfig {
    pub fn source_interval(&self) -> Duration {
        Duration::from_secs_f64(self.default_source_interval_seconds.max(0.0))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs_f64(self.shutdown_grace_seconds.max(0.0))
    }

    pub fn with_source_interval(mut self, interval: Duration) -> Self {
        self.default_source_interval_seconds = interval.as_secs_f64();
        self
    }

    pub fn with_failure_limit(mut self, limit: u32) -> Self {
        self.consecutive_failure_limit = limit;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace_seconds = grace.as_secs_f64();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RuntimeConfig::default();
        assert!((config.default_source_interval_seconds - 1.0 / 30.0).abs() < 1e-9);
        assert_eq!(config.consecutive_failure_limit, 16);
        assert_eq!(config.shutdown_grace_seconds, 2.0);
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"consecutive_failure_limit": 3}"#).unwrap();
        assert_eq!(config.consecutive_failure_limit, 3);
        assert_eq!(config.shutdown_grace_seconds, 2.0);
    }
}

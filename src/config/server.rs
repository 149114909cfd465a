//! # Probe Server Settings
//!
//! Port and startup deadline of the metrics and probe server.

use super::env_var_or_default;
use crate::constants::{DEFAULT_METRICS_PORT, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS};
use std::time::Duration;

/// Metrics and probe server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port serving `/metrics`, `/healthz` and `/readyz` (METRICS_PORT)
    pub metrics_port: u16,
    /// Startup fails when the server is not bound within this time (SERVER_STARTUP_TIMEOUT_SECS)
    pub startup_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            startup_timeout: Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            startup_timeout: Duration::from_secs(env_var_or_default(
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.metrics_port, 8080);
        assert_eq!(config.startup_timeout, Duration::from_secs(10));
    }
}

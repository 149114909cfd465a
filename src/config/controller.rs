//! # Reconciler Settings
//!
//! Settings for the reconcile loop loaded from environment variables.

use super::env_var_or_default;
use std::str::FromStr;
use std::time::Duration;

/// Cluster flavour the controller runs on
///
/// OpenShift exposes the main service through a `Route` and supports the
/// OAuth redirect annotation on service accounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Platform {
    #[default]
    Kubernetes,
    OpenShift,
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kubernetes" | "k8s" => Ok(Platform::Kubernetes),
            "openshift" | "ocp" => Ok(Platform::OpenShift),
            other => Err(format!(
                "unknown platform '{other}', expected kubernetes or openshift"
            )),
        }
    }
}

/// Reconciler configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Cluster flavour (PLATFORM)
    pub platform: Platform,
    /// Maximum number of reconcile passes running in parallel (RECONCILE_CONCURRENCY)
    pub concurrency: u16,
    /// Requeue interval after a successful pass (RESYNC_INTERVAL_SECS)
    pub resync_interval: Duration,
    /// Minimum error backoff (BACKOFF_MIN_SECS)
    pub backoff_min_secs: u64,
    /// Maximum error backoff (BACKOFF_MAX_SECS)
    pub backoff_max_secs: u64,
    /// Restrict namespaced installations to one namespace (WATCH_NAMESPACE)
    pub watch_namespace: Option<String>,
    /// Event reporter name (REPORTER_NAME)
    pub reporter_name: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            platform: Platform::default(),
            concurrency: DEFAULT_RECONCILE_CONCURRENCY,
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            watch_namespace: None,
            reporter_name: DEFAULT_REPORTER_NAME.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            platform: env_var_or_default("PLATFORM", Platform::Kubernetes),
            concurrency: env_var_or_default("RECONCILE_CONCURRENCY", DEFAULT_RECONCILE_CONCURRENCY)
                .max(1),
            resync_interval: Duration::from_secs(env_var_or_default(
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            )),
            backoff_min_secs: env_var_or_default("BACKOFF_MIN_SECS", DEFAULT_BACKOFF_MIN_SECS),
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
            watch_namespace: std::env::var("WATCH_NAMESPACE")
                .ok()
                .filter(|ns| !ns.trim().is_empty()),
            reporter_name: std::env::var("REPORTER_NAME")
                .unwrap_or_else(|_| DEFAULT_REPORTER_NAME.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parsing() {
        assert_eq!("openshift".parse::<Platform>().unwrap(), Platform::OpenShift);
        assert_eq!(" OCP ".parse::<Platform>().unwrap(), Platform::OpenShift);
        assert_eq!("k8s".parse::<Platform>().unwrap(), Platform::Kubernetes);
        assert!("nomad".parse::<Platform>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.platform, Platform::Kubernetes);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.resync_interval, Duration::from_secs(300));
        assert!(config.watch_namespace.is_none());
    }
}

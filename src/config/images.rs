//! # Image Resolution
//!
//! Container image references per component, overridable through environment
//! variables and resolved once per reconcile pass.

/// Resolved image references for every managed component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSet {
    pub server: String,
    pub database: String,
    pub object_storage: String,
    pub report_generator: String,
    pub grafana: String,
}

const DEFAULT_SERVER_IMAGE: &str = "ghcr.io/microscaler/observatory-server:1.4.0";
const DEFAULT_DATABASE_IMAGE: &str = "docker.io/library/postgres:16.4";
const DEFAULT_OBJECT_STORAGE_IMAGE: &str = "quay.io/minio/minio:RELEASE.2024-08-17T01-24-54Z";
const DEFAULT_REPORT_GENERATOR_IMAGE: &str = "ghcr.io/microscaler/observatory-reports:1.4.0";
const DEFAULT_GRAFANA_IMAGE: &str = "docker.io/grafana/grafana:11.2.0";

impl ImageSet {
    /// Resolve images from the process environment
    pub fn from_env() -> Self {
        Self::resolve(|key| std::env::var(key).ok())
    }

    /// Resolve images through `lookup`, falling back to the built-in references
    /// for unset or blank values
    pub fn resolve<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |key: &str, fallback: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| fallback.to_string())
        };

        Self {
            server: pick("INSTALLATION_IMAGE_SERVER", DEFAULT_SERVER_IMAGE),
            database: pick("INSTALLATION_IMAGE_DATABASE", DEFAULT_DATABASE_IMAGE),
            object_storage: pick("INSTALLATION_IMAGE_OBJECT_STORAGE", DEFAULT_OBJECT_STORAGE_IMAGE),
            report_generator: pick("INSTALLATION_IMAGE_REPORTS", DEFAULT_REPORT_GENERATOR_IMAGE),
            grafana: pick("INSTALLATION_IMAGE_GRAFANA", DEFAULT_GRAFANA_IMAGE),
        }
    }
}

impl Default for ImageSet {
    fn default() -> Self {
        Self::resolve(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_fallbacks_when_unset() {
        let images = ImageSet::resolve(|_| None);
        assert_eq!(images.database, DEFAULT_DATABASE_IMAGE);
        assert_eq!(images.grafana, DEFAULT_GRAFANA_IMAGE);
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("INSTALLATION_IMAGE_SERVER", "registry.local/server:dev"),
            ("INSTALLATION_IMAGE_DATABASE", "   "),
        ]);
        let images = ImageSet::resolve(|key| env.get(key).map(|v| (*v).to_string()));
        assert_eq!(images.server, "registry.local/server:dev");
        assert_eq!(images.database, DEFAULT_DATABASE_IMAGE);
    }
}

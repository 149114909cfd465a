//! # Custom Resource Definitions
//!
//! CRD types for the Installation Controller.
//!
//! Two custom resources describe the same application installation:
//!
//! - `Installation` is namespaced; the application is installed into the
//!   namespace of the resource itself.
//! - `ClusterInstallation` is cluster-scoped and names its install namespace
//!   explicitly.
//!
//! Both share [`InstallationSpec`] and [`InstallationStatus`]. The controller
//! never looks at the concrete kind past the boundary, see
//! [`crate::instance::Instance`].
//!
//! Foreign CRDs the controller writes (cert-manager, OpenShift routes) live in
//! the `cert_manager` and `route` sub-modules.

pub mod cert_manager;
pub mod route;
mod status;

pub use status::{Condition, InstallationStatus};

use kube::CustomResource;
use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Installation Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: installation.microscaler.io/v1
/// kind: Installation
/// metadata:
///   name: observatory
///   namespace: observatory-system
/// spec:
///   targetNamespaces: [payments, checkout]
///   installMode: Full
///   tls:
///     enabled: true
///   reportGenerator:
///     replicas: 2
///   exposure:
///     type: Ingress
///     host: observatory.example.com
/// ```
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Installation",
    group = "installation.microscaler.io",
    version = "v1",
    namespaced,
    status = "InstallationStatus",
    shortname = "inst",
    derive = "PartialEq",
    printcolumn = r#"{"name":"URL", "type":"string", "jsonPath":".status.url"}, {"name":"TLS", "type":"string", "jsonPath":".status.conditions[?(@.type==\"TLSSetupComplete\")].status"}, {"name":"Available", "type":"string", "jsonPath":".status.conditions[?(@.type==\"ServerAvailable\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InstallationSpec {
    /// Namespaces whose workloads the installation may observe
    /// An empty list means the install namespace only
    #[serde(default)]
    pub target_namespaces: Vec<String>,
    /// Full installs every component, Minimal leaves out Grafana
    #[serde(default)]
    pub install_mode: InstallMode,
    /// TLS bootstrap through cert-manager
    #[serde(default)]
    pub tls: TlsSpec,
    /// Main service settings
    #[serde(default)]
    pub server: ServerSpec,
    /// Stateless report generator replicas; zero removes the component
    #[serde(default)]
    pub report_generator: ReportGeneratorSpec,
    /// Database storage
    #[serde(default)]
    pub database: StorageComponentSpec,
    /// Object storage
    #[serde(default)]
    pub object_storage: StorageComponentSpec,
    /// How the main service is exposed outside the cluster
    #[serde(default)]
    pub exposure: ExposureSpec,
    /// Annotate the service account for platform single sign-on (OpenShift only)
    #[serde(default)]
    pub sso: bool,
    /// Optional network policy admitting ingress traffic to the main service
    #[serde(default)]
    pub network_policy: NetworkPolicySpec,
}

/// ClusterInstallation Custom Resource Definition
///
/// Cluster-scoped variant of [`Installation`]. The install namespace is not
/// implied by the resource, so it must be named explicitly.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "ClusterInstallation",
    group = "installation.microscaler.io",
    version = "v1",
    status = "InstallationStatus",
    shortname = "cinst",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Namespace", "type":"string", "jsonPath":".spec.installNamespace"}, {"name":"URL", "type":"string", "jsonPath":".status.url"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInstallationSpec {
    /// Namespace the application components are installed into
    pub install_namespace: String,
    /// Installation body, identical to the namespaced resource
    #[serde(flatten)]
    pub installation: InstallationSpec,
}

/// Install mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum InstallMode {
    #[default]
    Full,
    Minimal,
}

impl InstallMode {
    /// Grafana is only part of a full install
    pub fn includes_grafana(self) -> bool {
        matches!(self, InstallMode::Full)
    }
}

impl JsonSchema for InstallMode {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("InstallMode")
    }

    fn json_schema(_gen: &mut SchemaGenerator) -> Schema {
        // Plain string enum keeps the CRD schema structural
        schemars::json_schema!({
            "type": "string",
            "enum": ["Full", "Minimal"],
            "description": "Full installs every component. Minimal leaves out Grafana."
        })
    }
}

/// TLS configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TlsSpec {
    /// Issue certificates through cert-manager (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for TlsSpec {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Main service settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    #[serde(default = "default_one")]
    pub replicas: i32,
}

impl Default for ServerSpec {
    fn default() -> Self {
        Self { replicas: 1 }
    }
}

/// Report generator settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportGeneratorSpec {
    #[serde(default)]
    pub replicas: i32,
}

/// Storage-backed component (database, object storage)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageComponentSpec {
    /// Requested claim size as a Kubernetes quantity (default: "10Gi")
    #[serde(default = "default_storage_size")]
    pub size: String,
    /// Storage class for the claim; cluster default when unset
    #[serde(default)]
    pub storage_class_name: Option<String>,
}

impl Default for StorageComponentSpec {
    fn default() -> Self {
        Self {
            size: default_storage_size(),
            storage_class_name: None,
        }
    }
}

/// Network exposure of the main service
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExposureSpec {
    #[serde(default, rename = "type")]
    pub type_: ExposureType,
    /// External host name. Routes get one assigned by the router when unset
    #[serde(default)]
    pub host: Option<String>,
    /// Ingress class, only used for `Ingress`
    #[serde(default)]
    pub ingress_class_name: Option<String>,
}

/// Exposure type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ExposureType {
    /// Cluster-internal service only
    #[default]
    None,
    Ingress,
    /// OpenShift route
    Route,
}

/// Network policy settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicySpec {
    #[serde(default)]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

fn default_one() -> i32 {
    1
}

fn default_storage_size() -> String {
    "10Gi".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installation_spec_defaults() {
        let spec: InstallationSpec = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(spec.target_namespaces.is_empty());
        assert_eq!(spec.install_mode, InstallMode::Full);
        assert!(spec.tls.enabled);
        assert_eq!(spec.server.replicas, 1);
        assert_eq!(spec.report_generator.replicas, 0);
        assert_eq!(spec.database.size, "10Gi");
        assert_eq!(spec.exposure.type_, ExposureType::None);
    }

    #[test]
    fn test_cluster_installation_spec_flattens_body() {
        let spec: ClusterInstallationSpec = serde_json::from_value(serde_json::json!({
            "installNamespace": "observatory",
            "targetNamespaces": ["a", "b"],
            "installMode": "Minimal",
            "tls": {"enabled": false}
        }))
        .unwrap();
        assert_eq!(spec.install_namespace, "observatory");
        assert_eq!(spec.installation.target_namespaces, vec!["a", "b"]);
        assert_eq!(spec.installation.install_mode, InstallMode::Minimal);
        assert!(!spec.installation.tls.enabled);
    }

    #[test]
    fn test_exposure_type_field_name() {
        let exposure: ExposureSpec =
            serde_json::from_value(serde_json::json!({"type": "Route"})).unwrap();
        assert_eq!(exposure.type_, ExposureType::Route);
        assert!(exposure.host.is_none());
    }

    #[test]
    fn test_grafana_only_in_full_mode() {
        assert!(InstallMode::Full.includes_grafana());
        assert!(!InstallMode::Minimal.includes_grafana());
    }
}

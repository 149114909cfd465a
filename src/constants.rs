//! # Constants
//!
//! Well-known names, labels and default values shared across the controller.

use std::time::Duration;

/// Finalizer attached to every installation; gates teardown of cross-namespace objects
pub const FINALIZER: &str = "installation.microscaler.io/finalizer";

/// Field manager used for status and metadata patches
pub const FIELD_MANAGER: &str = "installation-controller";

/// Delay before re-checking a certificate or exposure host that is not ready yet
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Delay before re-checking cross-namespace objects that are still terminating
pub const TEARDOWN_RETRY_INTERVAL: Duration = Duration::from_secs(5);

// Labels and annotations
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_INSTANCE: &str = "installation.microscaler.io/instance";
pub const MANAGED_BY_VALUE: &str = "installation-controller";

/// Secret values carrying this annotation are generated once and never regenerated
pub const ANNOTATION_GENERATED: &str = "installation.microscaler.io/generated";
/// Pod template annotation holding a digest of the CA, rolls pods on rotation
pub const ANNOTATION_CA_DIGEST: &str = "installation.microscaler.io/ca-digest";
/// OpenShift OAuth redirect reference on the service account
pub const ANNOTATION_OAUTH_REDIRECT: &str =
    "serviceaccounts.openshift.io/oauth-redirectreference.primary";

// Cluster roles installed alongside the controller, printed by `crdgen`
pub const CLUSTER_READER_ROLE: &str = "installation-cluster-reader";
pub const NAMESPACE_READER_ROLE: &str = "installation-namespace-reader";
pub const CONTROLLER_ROLE: &str = "installation-controller";

// Server defaults
pub const DEFAULT_METRICS_PORT: u16 = 8080;
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;
/// How often startup checks whether the server is bound
pub const SERVER_READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

// Controller defaults
pub const DEFAULT_RECONCILE_CONCURRENCY: u16 = 4;
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 1;
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;
pub const DEFAULT_REPORTER_NAME: &str = "installation-controller";

// Component ports
pub const SERVER_PORT: i32 = 8443;
pub const SERVER_HTTP_PORT: i32 = 8080;
pub const DATABASE_PORT: i32 = 5432;
pub const OBJECT_STORAGE_PORT: i32 = 9000;
pub const REPORTS_PORT: i32 = 8090;
pub const GRAFANA_PORT: i32 = 3000;

//! # Desired Objects
//!
//! Builders that turn an installation into fully formed object specs.
//!
//! Builders have no control flow beyond the installation fields and never talk to the
//! cluster. Every builder returns the typed object; the reconcile components
//! wrap it in a [`crate::controller::resources::ManagedObject`] and hand it to
//! the applier.
//!
//! ## Sub-modules
//!
//! - `certificates` - cert-manager issuers and certificates
//! - `network` - ingress, route and network policy
//! - `rbac` - service account, role and bindings
//! - `storage` - claims, generated secrets and marker config maps
//! - `workloads` - deployments and services

pub mod certificates;
pub mod network;
pub mod rbac;
pub mod storage;
pub mod workloads;

use crate::constants::{LABEL_COMPONENT, LABEL_NAME, LABEL_PART_OF};
use crate::controller::conditions::Component;
use crate::instance::Instance;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Application name used in the `app.kubernetes.io/name` label
pub const APP_NAME: &str = "installation";

/// Deterministic names of every object an installation manages
#[derive(Debug, Clone)]
pub struct Names {
    name: String,
    prefix: String,
    id: String,
}

impl Names {
    pub fn new(instance: &Instance) -> Self {
        Self {
            name: instance.name().to_string(),
            prefix: instance.shared_prefix(),
            id: instance.id(),
        }
    }

    fn local(&self, suffix: &str) -> String {
        format!("{}-{suffix}", self.name)
    }

    fn shared(&self, suffix: &str) -> String {
        format!("{}-{suffix}", self.prefix)
    }

    /// Deployment and Service of a component
    pub fn workload(&self, component: Component) -> String {
        self.local(component.suffix())
    }

    pub fn database_claim(&self) -> String {
        self.local("database-data")
    }

    pub fn object_storage_claim(&self) -> String {
        self.local("object-storage-data")
    }

    pub fn database_secret(&self) -> String {
        self.local("database-credentials")
    }

    pub fn object_storage_secret(&self) -> String {
        self.local("object-storage-credentials")
    }

    pub fn keystore_secret(&self) -> String {
        self.local("keystore-password")
    }

    pub fn lock(&self) -> String {
        self.local("install-lock")
    }

    pub fn trust_bundle(&self) -> String {
        self.local("trust-bundle")
    }

    pub fn selfsigned_issuer(&self) -> String {
        self.local("selfsigned")
    }

    pub fn ca_certificate(&self) -> String {
        self.local("ca")
    }

    pub fn ca_secret(&self) -> String {
        self.local("ca-tls")
    }

    pub fn ca_issuer(&self) -> String {
        self.local("ca-issuer")
    }

    /// Leaf certificate of a component; the backing secret has the same name
    pub fn leaf_certificate(&self, component: Component) -> String {
        self.local(&format!("{}-tls", component.suffix()))
    }

    pub fn service_account(&self) -> String {
        self.name.clone()
    }

    pub fn role(&self) -> String {
        self.name.clone()
    }

    pub fn local_binding(&self) -> String {
        self.local("local")
    }

    pub fn network_policy(&self) -> String {
        self.local("server-ingress")
    }

    pub fn observer_binding(&self) -> String {
        self.shared("observer")
    }

    /// Public CA certificate published into a target namespace
    pub fn ca_copy(&self) -> String {
        self.shared("ca-tls")
    }

    /// Agent certificate for `namespace`, issued in the install namespace
    pub fn agent_certificate(&self, namespace: &str) -> String {
        self.local(&format!("agent-{namespace}"))
    }

    /// Copy of the agent certificate secret in its target namespace

    pub fn agent_secret(&self) -> String {
        self.shared("agent-tls")
    }

    pub fn cluster_binding(&self) -> String {
        format!("installation-observer-{}", self.id)
    }
}

/// Labels selecting the pods of one component; never change once created
pub fn selector_labels(instance: &Instance, component: Component) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), APP_NAME.to_string()),
        (LABEL_PART_OF.to_string(), instance.name().to_string()),
        (LABEL_COMPONENT.to_string(), component.suffix().to_string()),
    ])
}

/// Instance labels plus the component selector labels
pub fn component_labels(instance: &Instance, component: Component) -> BTreeMap<String, String> {
    let mut labels = instance.labels();
    labels.extend(selector_labels(instance, component));
    labels
}

/// Metadata for an object in `namespace`
pub fn meta(name: &str, namespace: &str, labels: BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(labels),
        ..Default::default()
    }
}

/// Metadata for a cluster-scoped object
pub fn cluster_meta(name: &str, labels: BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        labels: Some(labels),
        ..Default::default()
    }
}

/// In-cluster DNS names of a service
pub fn service_dns_names(service: &str, namespace: &str) -> Vec<String> {
    vec![
        service.to_string(),
        format!("{service}.{namespace}"),
        format!("{service}.{namespace}.svc"),
        format!("{service}.{namespace}.svc.cluster.local"),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::crd::{Installation, InstallationSpec};
    use crate::instance::Instance;
    use std::sync::Arc;

    pub fn instance(spec: InstallationSpec) -> Instance {
        let mut installation = Installation::new("obs", spec);
        installation.metadata.namespace = Some("obs-system".to_string());
        installation.metadata.uid = Some("uid-obs".to_string());
        Instance::from_namespaced(Arc::new(installation))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::instance;
    use super::*;
    use crate::crd::InstallationSpec;

    #[test]
    fn test_local_and_shared_names() {
        let instance = instance(InstallationSpec::default());
        let names = Names::new(&instance);
        assert_eq!(names.workload(Component::ObjectStorage), "obs-object-storage");
        assert_eq!(names.leaf_certificate(Component::Server), "obs-server-tls");
        assert_eq!(names.lock(), "obs-install-lock");
        assert_eq!(
            names.observer_binding(),
            format!("{}-observer", instance.shared_prefix())
        );
        assert_eq!(
            names.cluster_binding(),
            format!("installation-observer-{}", instance.id())
        );
    }

    #[test]
    fn test_component_labels_include_selector_and_instance() {
        let instance = instance(InstallationSpec::default());
        let labels = component_labels(&instance, Component::Server);
        for (k, v) in selector_labels(&instance, Component::Server) {
            assert_eq!(labels.get(&k), Some(&v));
        }
        assert!(labels.contains_key(crate::constants::LABEL_INSTANCE));
    }
}

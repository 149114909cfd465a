//! # Instance
//!
//! Kind-agnostic view over `Installation` and `ClusterInstallation`.
//!
//! One [`Instance`] is built per reconcile pass at the controller boundary.
//! Everything past that point reads name, install namespace, target namespaces,
//! spec and status through it and never branches on the concrete kind again.

use crate::constants::{LABEL_INSTANCE, LABEL_MANAGED_BY, LABEL_PART_OF, MANAGED_BY_VALUE};
use crate::crd::{ClusterInstallation, Installation, InstallationSpec, InstallationStatus};
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, LazyLock};

static DNS1123_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$").expect("static regex is valid")
});

/// Underlying custom resource
#[derive(Debug, Clone)]
pub enum InstanceHandle {
    Namespaced(Arc<Installation>),
    Cluster(Arc<ClusterInstallation>),
}

/// Normalized installation
#[derive(Debug, Clone)]
pub struct Instance {
    handle: InstanceHandle,
    name: String,
    install_namespace: String,
}

impl Instance {
    pub fn from_namespaced(installation: Arc<Installation>) -> Self {
        let name = installation.name_any();
        let install_namespace = installation.namespace().unwrap_or_else(|| "default".to_string());
        Self {
            handle: InstanceHandle::Namespaced(installation),
            name,
            install_namespace,
        }
    }

    pub fn from_cluster(installation: Arc<ClusterInstallation>) -> Self {
        let name = installation.name_any();
        let install_namespace = installation.spec.install_namespace.clone();
        Self {
            handle: InstanceHandle::Cluster(installation),
            name,
            install_namespace,
        }
    }

    pub fn handle(&self) -> &InstanceHandle {
        &self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn install_namespace(&self) -> &str {
        &self.install_namespace
    }

    /// Kind of the underlying resource, only used for identity and messages
    pub fn kind(&self) -> &'static str {
        match &self.handle {
            InstanceHandle::Namespaced(_) => "Installation",
            InstanceHandle::Cluster(_) => "ClusterInstallation",
        }
    }

    /// Namespace of the custom resource itself; `None` for cluster-scoped resources
    pub fn resource_namespace(&self) -> Option<&str> {
        match &self.handle {
            InstanceHandle::Namespaced(_) => Some(&self.install_namespace),
            InstanceHandle::Cluster(_) => None,
        }
    }

    pub fn spec(&self) -> &InstallationSpec {
        match &self.handle {
            InstanceHandle::Namespaced(i) => &i.spec,
            InstanceHandle::Cluster(i) => &i.spec.installation,
        }
    }

    pub fn status(&self) -> Option<&InstallationStatus> {
        match &self.handle {
            InstanceHandle::Namespaced(i) => i.status.as_ref(),
            InstanceHandle::Cluster(i) => i.status.as_ref(),
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match &self.handle {
            InstanceHandle::Namespaced(i) => i.meta(),
            InstanceHandle::Cluster(i) => i.meta(),
        }
    }

    pub fn is_deleting(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }

    pub fn finalizers(&self) -> Vec<String> {
        self.meta().finalizers.clone().unwrap_or_default()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.meta()
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == finalizer))
    }

    /// Controller owner reference for children in the install namespace
    pub fn owner_reference(&self) -> Option<OwnerReference> {
        match &self.handle {
            InstanceHandle::Namespaced(i) => i.controller_owner_ref(&()),
            InstanceHandle::Cluster(i) => i.controller_owner_ref(&()),
        }
    }

    /// Object reference used when publishing events
    pub fn object_ref(&self) -> ObjectReference {
        match &self.handle {
            InstanceHandle::Namespaced(i) => i.object_ref(&()),
            InstanceHandle::Cluster(i) => i.object_ref(&()),
        }
    }

    /// Human readable identity, e.g. `Installation observatory/main`
    pub fn display_name(&self) -> String {
        match self.resource_namespace() {
            Some(ns) => format!("{} {}/{}", self.kind(), ns, self.name),
            None => format!("{} {}", self.kind(), self.name),
        }
    }

    /// Stable identity derived from (kind, name, namespace)
    ///
    /// Used for names and labels of objects that cannot carry an owner reference.
    pub fn id(&self) -> String {
        instance_id(self.kind(), &self.name, self.resource_namespace().unwrap_or(""))
    }

    /// Name prefix for objects created outside the install namespace
    pub fn shared_prefix(&self) -> String {
        let id = self.id();
        format!("{}-{}", self.name, &id[..8])
    }

    /// Labels every child object carries
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string()),
            (LABEL_PART_OF.to_string(), self.name.clone()),
            (LABEL_INSTANCE.to_string(), self.id()),
        ])
    }

    /// Desired target namespaces, normalized
    ///
    /// Trimmed, deduplicated and sorted. An empty list means the install
    /// namespace only. Entries that are not valid namespace names are returned
    /// as the error.
    pub fn target_namespaces(&self) -> Result<Vec<String>, Vec<String>> {
        let mut invalid = Vec::new();
        let mut namespaces = BTreeSet::new();
        for raw in &self.spec().target_namespaces {
            let ns = raw.trim();
            if DNS1123_LABEL.is_match(ns) {
                namespaces.insert(ns.to_string());
            } else {
                invalid.push(raw.clone());
            }
        }
        if !invalid.is_empty() {
            return Err(invalid);
        }
        if namespaces.is_empty() {
            namespaces.insert(self.install_namespace.clone());
        }
        Ok(namespaces.into_iter().collect())
    }

    /// Target namespaces applied by the last successful pass
    pub fn applied_target_namespaces(&self) -> Vec<String> {
        self.status()
            .map(|s| s.target_namespaces.clone())
            .unwrap_or_default()
    }
}

/// First 16 hex characters of SHA-256 over `kind/name/namespace`
pub fn instance_id(kind: &str, name: &str, namespace: &str) -> String {
    let digest = Sha256::digest(format!("{kind}/{name}/{namespace}").as_bytes());
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ClusterInstallationSpec;

    fn namespaced(targets: &[&str]) -> Instance {
        let mut installation = Installation::new(
            "observatory",
            InstallationSpec {
                target_namespaces: targets.iter().map(|s| (*s).to_string()).collect(),
                ..Default::default()
            },
        );
        installation.metadata.namespace = Some("obs-system".to_string());
        installation.metadata.uid = Some("uid-1".to_string());
        Instance::from_namespaced(Arc::new(installation))
    }

    #[test]
    fn test_target_namespaces_normalized() {
        let instance = namespaced(&["payments", " checkout ", "payments"]);
        assert_eq!(
            instance.target_namespaces().unwrap(),
            vec!["checkout".to_string(), "payments".to_string()]
        );
    }

    #[test]
    fn test_empty_targets_default_to_install_namespace() {
        let instance = namespaced(&[]);
        assert_eq!(instance.target_namespaces().unwrap(), vec!["obs-system"]);
    }

    #[test]
    fn test_invalid_target_namespace_rejected() {
        let instance = namespaced(&["ok", "Not_Valid"]);
        assert_eq!(instance.target_namespaces().unwrap_err(), vec!["Not_Valid"]);
    }

    #[test]
    fn test_cluster_instance_uses_spec_namespace() {
        let mut installation = ClusterInstallation::new(
            "observatory",
            ClusterInstallationSpec {
                install_namespace: "obs".to_string(),
                installation: InstallationSpec::default(),
            },
        );
        installation.metadata.uid = Some("uid-2".to_string());
        let instance = Instance::from_cluster(Arc::new(installation));
        assert_eq!(instance.install_namespace(), "obs");
        assert_eq!(instance.resource_namespace(), None);
        assert_eq!(instance.kind(), "ClusterInstallation");
        assert!(instance.owner_reference().is_some());
    }

    #[test]
    fn test_identity_differs_between_kinds() {
        let a = instance_id("Installation", "observatory", "obs");
        let b = instance_id("ClusterInstallation", "observatory", "");
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
        assert_eq!(a, instance_id("Installation", "observatory", "obs"));
    }

    #[test]
    fn test_shared_prefix() {
        let instance = namespaced(&[]);
        let prefix = instance.shared_prefix();
        assert!(prefix.starts_with("observatory-"));
        assert_eq!(prefix.len(), "observatory-".len() + 8);
    }
}

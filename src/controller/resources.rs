//! # Managed Resource Kinds
//!
//! The closed set of object kinds the controller writes, plus identity keys.
//!
//! Every kind is a variant of [`ManagedObject`]; code that needs per-kind
//! behaviour matches exhaustively instead of downcasting.

use crate::crd::cert_manager::{Certificate, Issuer};
use crate::crd::route::Route;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMap, PersistentVolumeClaim, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::fmt;

/// Kinds managed by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    ConfigMap,
    Secret,
    Service,
    Ingress,
    Route,
    NetworkPolicy,
    PersistentVolumeClaim,
    ServiceAccount,
    Role,
    RoleBinding,
    ClusterRoleBinding,
    Issuer,
    Certificate,
    Deployment,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 14] = [
        ResourceKind::ConfigMap,
        ResourceKind::Secret,
        ResourceKind::Service,
        ResourceKind::Ingress,
        ResourceKind::Route,
        ResourceKind::NetworkPolicy,
        ResourceKind::PersistentVolumeClaim,
        ResourceKind::ServiceAccount,
        ResourceKind::Role,
        ResourceKind::RoleBinding,
        ResourceKind::ClusterRoleBinding,
        ResourceKind::Issuer,
        ResourceKind::Certificate,
        ResourceKind::Deployment,
    ];

    /// API group and plural resource name, as used in RBAC rules
    pub fn api_resource(self) -> (&'static str, &'static str) {
        match self {
            ResourceKind::ConfigMap => ("", "configmaps"),
            ResourceKind::Secret => ("", "secrets"),
            ResourceKind::Service => ("", "services"),
            ResourceKind::Ingress => ("networking.k8s.io", "ingresses"),
            ResourceKind::Route => ("route.openshift.io", "routes"),
            ResourceKind::NetworkPolicy => ("networking.k8s.io", "networkpolicies"),
            ResourceKind::PersistentVolumeClaim => ("", "persistentvolumeclaims"),
            ResourceKind::ServiceAccount => ("", "serviceaccounts"),
            ResourceKind::Role => ("rbac.authorization.k8s.io", "roles"),
            ResourceKind::RoleBinding => ("rbac.authorization.k8s.io", "rolebindings"),
            ResourceKind::ClusterRoleBinding => ("rbac.authorization.k8s.io", "clusterrolebindings"),
            ResourceKind::Issuer => ("cert-manager.io", "issuers"),
            ResourceKind::Certificate => ("cert-manager.io", "certificates"),
            ResourceKind::Deployment => ("apps", "deployments"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Secret => "Secret",
            ResourceKind::Service => "Service",
            ResourceKind::Ingress => "Ingress",
            ResourceKind::Route => "Route",
            ResourceKind::NetworkPolicy => "NetworkPolicy",
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
            ResourceKind::ServiceAccount => "ServiceAccount",
            ResourceKind::Role => "Role",
            ResourceKind::RoleBinding => "RoleBinding",
            ResourceKind::ClusterRoleBinding => "ClusterRoleBinding",
            ResourceKind::Issuer => "Issuer",
            ResourceKind::Certificate => "Certificate",
            ResourceKind::Deployment => "Deployment",
        }
    }

    pub fn is_cluster_scoped(self) -> bool {
        matches!(self, ResourceKind::ClusterRoleBinding)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one object: kind, namespace (none for cluster-scoped) and name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub kind: ResourceKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn namespaced(kind: ResourceKind, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }

    pub fn cluster(kind: ResourceKind, name: &str) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// A typed object of one of the managed kinds
#[derive(Debug, Clone, PartialEq)]
pub enum ManagedObject {
    ConfigMap(ConfigMap),
    Secret(Secret),
    Service(Service),
    Ingress(Ingress),
    Route(Route),
    NetworkPolicy(NetworkPolicy),
    PersistentVolumeClaim(PersistentVolumeClaim),
    ServiceAccount(ServiceAccount),
    Role(Role),
    RoleBinding(RoleBinding),
    ClusterRoleBinding(ClusterRoleBinding),
    Issuer(Issuer),
    Certificate(Certificate),
    Deployment(Deployment),
}

impl ManagedObject {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ManagedObject::ConfigMap(_) => ResourceKind::ConfigMap,
            ManagedObject::Secret(_) => ResourceKind::Secret,
            ManagedObject::Service(_) => ResourceKind::Service,
            ManagedObject::Ingress(_) => ResourceKind::Ingress,
            ManagedObject::Route(_) => ResourceKind::Route,
            ManagedObject::NetworkPolicy(_) => ResourceKind::NetworkPolicy,
            ManagedObject::PersistentVolumeClaim(_) => ResourceKind::PersistentVolumeClaim,
            ManagedObject::ServiceAccount(_) => ResourceKind::ServiceAccount,
            ManagedObject::Role(_) => ResourceKind::Role,
            ManagedObject::RoleBinding(_) => ResourceKind::RoleBinding,
            ManagedObject::ClusterRoleBinding(_) => ResourceKind::ClusterRoleBinding,
            ManagedObject::Issuer(_) => ResourceKind::Issuer,
            ManagedObject::Certificate(_) => ResourceKind::Certificate,
            ManagedObject::Deployment(_) => ResourceKind::Deployment,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            ManagedObject::ConfigMap(o) => &o.metadata,
            ManagedObject::Secret(o) => &o.metadata,
            ManagedObject::Service(o) => &o.metadata,
            ManagedObject::Ingress(o) => &o.metadata,
            ManagedObject::Route(o) => &o.metadata,
            ManagedObject::NetworkPolicy(o) => &o.metadata,
            ManagedObject::PersistentVolumeClaim(o) => &o.metadata,
            ManagedObject::ServiceAccount(o) => &o.metadata,
            ManagedObject::Role(o) => &o.metadata,
            ManagedObject::RoleBinding(o) => &o.metadata,
            ManagedObject::ClusterRoleBinding(o) => &o.metadata,
            ManagedObject::Issuer(o) => &o.metadata,
            ManagedObject::Certificate(o) => &o.metadata,
            ManagedObject::Deployment(o) => &o.metadata,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            ManagedObject::ConfigMap(o) => &mut o.metadata,
            ManagedObject::Secret(o) => &mut o.metadata,
            ManagedObject::Service(o) => &mut o.metadata,
            ManagedObject::Ingress(o) => &mut o.metadata,
            ManagedObject::Route(o) => &mut o.metadata,
            ManagedObject::NetworkPolicy(o) => &mut o.metadata,
            ManagedObject::PersistentVolumeClaim(o) => &mut o.metadata,
            ManagedObject::ServiceAccount(o) => &mut o.metadata,
            ManagedObject::Role(o) => &mut o.metadata,
            ManagedObject::RoleBinding(o) => &mut o.metadata,
            ManagedObject::ClusterRoleBinding(o) => &mut o.metadata,
            ManagedObject::Issuer(o) => &mut o.metadata,
            ManagedObject::Certificate(o) => &mut o.metadata,
            ManagedObject::Deployment(o) => &mut o.metadata,
        }
    }

    pub fn key(&self) -> ObjectKey {
        let meta = self.meta();
        let name = meta.name.clone().unwrap_or_default();
        match (self.kind().is_cluster_scoped(), meta.namespace.as_deref()) {
            (false, Some(ns)) => ObjectKey::namespaced(self.kind(), ns, &name),
            _ => ObjectKey::cluster(self.kind(), &name),
        }
    }
}

macro_rules! impl_from_object {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for ManagedObject {
                fn from(object: $variant) -> Self {
                    ManagedObject::$variant(object)
                }
            }
        )*
    };
}

impl_from_object!(
    ConfigMap,
    Secret,
    Service,
    Ingress,
    Route,
    NetworkPolicy,
    PersistentVolumeClaim,
    ServiceAccount,
    Role,
    RoleBinding,
    ClusterRoleBinding,
    Issuer,
    Certificate,
    Deployment,
);

/// Typed access back out of a [`ManagedObject`]
pub trait TypedObject: Sized {
    fn from_managed(object: ManagedObject) -> Option<Self>;
}

macro_rules! impl_typed_object {
    ($($variant:ident),* $(,)?) => {
        $(
            impl TypedObject for $variant {
                fn from_managed(object: ManagedObject) -> Option<Self> {
                    match object {
                        ManagedObject::$variant(o) => Some(o),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_typed_object!(
    ConfigMap,
    Secret,
    Service,
    Ingress,
    Route,
    NetworkPolicy,
    PersistentVolumeClaim,
    ServiceAccount,
    Role,
    RoleBinding,
    ClusterRoleBinding,
    Issuer,
    Certificate,
    Deployment,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_for_namespaced_object() {
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some("lock".to_string()),
                namespace: Some("obs".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let object = ManagedObject::from(cm);
        assert_eq!(
            object.key(),
            ObjectKey::namespaced(ResourceKind::ConfigMap, "obs", "lock")
        );
        assert_eq!(object.key().to_string(), "ConfigMap obs/lock");
    }

    #[test]
    fn test_key_for_cluster_scoped_object_ignores_namespace() {
        let crb = ClusterRoleBinding {
            metadata: ObjectMeta {
                name: Some("binding".to_string()),
                namespace: Some("ignored".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let key = ManagedObject::from(crb).key();
        assert_eq!(key, ObjectKey::cluster(ResourceKind::ClusterRoleBinding, "binding"));
        assert_eq!(key.to_string(), "ClusterRoleBinding binding");
    }

    #[test]
    fn test_typed_round_trip() {
        let secret = Secret::default();
        let object = ManagedObject::from(secret.clone());
        assert_eq!(Secret::from_managed(object.clone()), Some(secret));
        assert!(ConfigMap::from_managed(object).is_none());
    }
}

//! Service account, namespace-local role and the observer bindings, plus the
//! cluster roles shipped with the controller (see the `crdgen` binary).

use super::{cluster_meta, meta, Names};
use crate::constants::{
    ANNOTATION_OAUTH_REDIRECT, CLUSTER_READER_ROLE, CONTROLLER_ROLE, LABEL_MANAGED_BY,
    MANAGED_BY_VALUE, NAMESPACE_READER_ROLE,
};
use crate::controller::conditions::Component;
use crate::controller::resources::ResourceKind;
use crate::instance::Instance;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use std::collections::BTreeMap;

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";
const INSTALLATION_GROUP: &str = "installation.microscaler.io";
const READ: [&str; 3] = ["get", "list", "watch"];
const WRITE: [&str; 7] = ["get", "list", "watch", "create", "update", "patch", "delete"];

/// Service account of every component pod
///
/// `oauth_redirect` annotates it so platform OAuth redirects back to the main route.
pub fn service_account(instance: &Instance, oauth_redirect: bool) -> ServiceAccount {
    let names = Names::new(instance);
    let mut metadata = meta(
        &names.service_account(),
        instance.install_namespace(),
        instance.labels(),
    );
    if oauth_redirect {
        let reference = serde_json::json!({
            "kind": "OAuthRedirectReference",
            "apiVersion": "v1",
            "reference": { "kind": "Route", "name": names.workload(Component::Server) },
        });
        metadata.annotations = Some(BTreeMap::from([(
            ANNOTATION_OAUTH_REDIRECT.to_string(),
            reference.to_string(),
        )]));
    }
    ServiceAccount {
        metadata,
        ..Default::default()
    }
}

fn rule(api_group: &str, resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![api_group.to_string()]),
        resources: Some(resources.iter().map(|r| (*r).to_string()).collect()),
        verbs: verbs.iter().map(|v| (*v).to_string()).collect(),
        ..Default::default()
    }
}

/// Read-only role over the install namespace
pub fn role(instance: &Instance) -> Role {
    Role {
        metadata: meta(
            &Names::new(instance).role(),
            instance.install_namespace(),
            instance.labels(),
        ),
        rules: Some(vec![
            rule("", &["configmaps", "secrets", "services", "pods"], &READ),
            rule("apps", &["deployments"], &READ),
        ]),
    }
}

fn service_account_subject(instance: &Instance) -> Vec<Subject> {
    vec![Subject {
        kind: "ServiceAccount".to_string(),
        name: Names::new(instance).service_account(),
        namespace: Some(instance.install_namespace().to_string()),
        ..Default::default()
    }]
}

pub fn local_binding(instance: &Instance) -> RoleBinding {
    let names = Names::new(instance);
    RoleBinding {
        metadata: meta(
            &names.local_binding(),
            instance.install_namespace(),
            instance.labels(),
        ),
        role_ref: RoleRef {
            api_group: RBAC_GROUP.to_string(),
            kind: "Role".to_string(),
            name: names.role(),
        },
        subjects: Some(service_account_subject(instance)),
    }
}

/// Binding that lets the installation observe workloads in `namespace`
pub fn observer_binding(instance: &Instance, namespace: &str) -> RoleBinding {
    RoleBinding {
        metadata: meta(
            &Names::new(instance).observer_binding(),
            namespace,
            instance.labels(),
        ),
        role_ref: RoleRef {
            api_group: RBAC_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: NAMESPACE_READER_ROLE.to_string(),
        },
        subjects: Some(service_account_subject(instance)),
    }
}

pub fn cluster_binding(instance: &Instance) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: cluster_meta(&Names::new(instance).cluster_binding(), instance.labels()),
        role_ref: RoleRef {
            api_group: RBAC_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: CLUSTER_READER_ROLE.to_string(),
        },
        subjects: Some(service_account_subject(instance)),
    }
}

fn cluster_role(name: &str, rules: Vec<PolicyRule>) -> ClusterRole {
    ClusterRole {
        metadata: cluster_meta(
            name,
            BTreeMap::from([(LABEL_MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string())]),
        ),
        rules: Some(rules),
        ..Default::default()
    }
}

/// Bound in every target namespace: observe the workloads running there
pub fn namespace_reader_role() -> ClusterRole {
    cluster_role(
        NAMESPACE_READER_ROLE,
        vec![
            rule("", &["pods", "services", "endpoints", "configmaps", "events"], &READ),
            rule("apps", &["deployments", "replicasets", "statefulsets", "daemonsets"], &READ),
            rule("batch", &["jobs", "cronjobs"], &READ),
        ],
    )
}

/// Bound cluster-wide once per installation
pub fn cluster_reader_role() -> ClusterRole {
    cluster_role(
        CLUSTER_READER_ROLE,
        vec![rule("", &["namespaces", "nodes"], &READ)],
    )
}

/// Permissions of the controller's own service account
///
/// Full access to every kind it writes, the installation resources and their
/// subresources, `bind` on the two reader roles, events and CRD discovery.
pub fn controller_role() -> ClusterRole {
    let mut by_group: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for kind in ResourceKind::ALL {
        let (group, resource) = kind.api_resource();
        by_group.entry(group).or_default().push(resource);
    }
    let mut rules: Vec<PolicyRule> = by_group
        .into_iter()
        .map(|(group, resources)| rule(group, &resources, &WRITE))
        .collect();

    rules.extend([
        rule(
            INSTALLATION_GROUP,
            &["installations", "clusterinstallations"],
            &["get", "list", "watch", "update", "patch"],
        ),
        rule(
            INSTALLATION_GROUP,
            &["installations/status", "clusterinstallations/status"],
            &["get", "update", "patch"],
        ),
        rule(
            INSTALLATION_GROUP,
            &["installations/finalizers", "clusterinstallations/finalizers"],
            &["update"],
        ),
        // The namespace-local role grants read access to pods
        rule("", &["pods"], &READ),
        PolicyRule {
            resource_names: Some(vec![
                NAMESPACE_READER_ROLE.to_string(),
                CLUSTER_READER_ROLE.to_string(),
            ]),
            ..rule(RBAC_GROUP, &["clusterroles"], &["bind"])
        },
        rule("events.k8s.io", &["events"], &["create", "patch"]),
        rule("apiextensions.k8s.io", &["customresourcedefinitions"], &["get"]),
    ]);
    cluster_role(CONTROLLER_ROLE, rules)
}

/// Every cluster role installed alongside the controller
pub fn shipped_cluster_roles() -> Vec<ClusterRole> {
    vec![controller_role(), namespace_reader_role(), cluster_reader_role()]
}

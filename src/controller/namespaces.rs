//! # Namespace Set
//!
//! RBAC for the target namespace set, and cleanup of everything the
//! installation placed in namespaces that left it.
//!
//! The target set can grow or shrink between passes. Objects outside the
//! install namespace cannot carry an owner reference, so every namespace that
//! may still hold one is tracked (see the lock marker in the reconciler) and
//! `stale = recorded - current` is cleaned up explicitly on every pass.
//!
//! Bindings for namespaces that stay in the set are re-applied: subjects and
//! roleRef are rewritten to correct drift, labels are merged.

use crate::config::Platform;
use crate::controller::applier::{Ownership, ResourceApplier};
use crate::controller::deployment::converge;
use crate::controller::error::ReconcileError;
use crate::controller::resources::{ObjectKey, ResourceKind};
use crate::crd::ExposureType;
use crate::desired::{rbac, Names};
use crate::instance::Instance;
use std::collections::BTreeSet;
use tracing::info;

/// Namespaces that held objects before this pass but are no longer targeted
pub fn stale_namespaces(recorded: &BTreeSet<String>, current: &[String]) -> BTreeSet<String> {
    recorded
        .iter()
        .filter(|ns| !current.contains(ns))
        .cloned()
        .collect()
}

/// Every object this installation may place in a target `namespace`
pub fn namespace_object_keys(instance: &Instance, namespace: &str) -> Vec<ObjectKey> {
    let names = Names::new(instance);
    vec![
        ObjectKey::namespaced(ResourceKind::RoleBinding, namespace, &names.observer_binding()),
        ObjectKey::namespaced(ResourceKind::Secret, namespace, &names.agent_secret()),
        ObjectKey::namespaced(ResourceKind::Secret, namespace, &names.ca_copy()),
    ]
}

/// Key of the cluster-scoped observer binding
pub fn cluster_binding_key(instance: &Instance) -> ObjectKey {
    ObjectKey::cluster(
        ResourceKind::ClusterRoleBinding,
        &Names::new(instance).cluster_binding(),
    )
}

/// Converge RBAC for `targets`, then remove everything left in `stale`
///
/// Certificate material for target namespaces is published by the TLS
/// bootstrap.
pub async fn reconcile(
    applier: &ResourceApplier<'_>,
    instance: &Instance,
    platform: Platform,
    targets: &[String],
    stale: &BTreeSet<String>,
) -> Result<(), ReconcileError> {
    let owner = Ownership::controller_of(instance)?;
    let shared = Ownership::labelled_for(instance);
    let spec = instance.spec();

    let oauth_redirect = platform == Platform::OpenShift
        && spec.sso
        && spec.exposure.type_ == ExposureType::Route;
    applier
        .apply(rbac::service_account(instance, oauth_redirect).into(), &owner)
        .await?;
    applier.apply(rbac::role(instance).into(), &owner).await?;
    converge(applier, rbac::local_binding(instance).into(), &owner).await?;

    for namespace in targets {
        converge(
            applier,
            rbac::observer_binding(instance, namespace).into(),
            &shared,
        )
        .await?;
    }

    converge(applier, rbac::cluster_binding(instance).into(), &shared).await?;

    for namespace in stale {
        remove_namespace(applier, instance, namespace).await?;
    }
    Ok(())
}

/// Delete every object this installation owns in `namespace`
pub async fn remove_namespace(
    applier: &ResourceApplier<'_>,
    instance: &Instance,
    namespace: &str,
) -> Result<(), ReconcileError> {
    let shared = Ownership::labelled_for(instance);
    for key in namespace_object_keys(instance, namespace) {
        applier.delete(&key, &shared).await?;
    }
    info!(parent: applier.log(), namespace = %namespace, "removed namespace from installation");
    Ok(())
}

//! # Finalizer
//!
//! Adds the finalizer and runs teardown when an installation is deleted.
//!
//! Children in the install namespace carry an owner reference and are garbage
//! collected by the cluster. Objects in other namespaces and the cluster
//! binding are not, so they are deleted here. The finalizer is only removed
//! once a re-read confirms every one of them is gone.

use super::lock;
use crate::constants::{FINALIZER, TEARDOWN_RETRY_INTERVAL};
use crate::controller::applier::{Ownership, ResourceApplier};
use crate::controller::cluster::ClusterApi;
use crate::controller::error::ReconcileError;
use crate::controller::namespaces::{cluster_binding_key, namespace_object_keys, remove_namespace};
use crate::controller::resources::ObjectKey;
use crate::instance::Instance;
use crate::observability::metrics;
use kube_runtime::controller::Action;
use std::collections::BTreeSet;
use tracing::info;

/// Add the finalizer to an installation that does not carry it yet
pub async fn add(api: &dyn ClusterApi, instance: &Instance) -> Result<(), ReconcileError> {
    let mut finalizers = instance.finalizers();
    finalizers.push(FINALIZER.to_string());
    api.patch_finalizers(instance.handle(), &finalizers)
        .await
        .map_err(|source| ReconcileError::InstanceUpdate {
            instance: instance.display_name(),
            source,
        })
}

/// Every namespace that may hold objects of the installation
async fn known_namespaces(
    applier: &ResourceApplier<'_>,
    instance: &Instance,
) -> Result<BTreeSet<String>, ReconcileError> {
    let mut namespaces = lock::recorded(applier, instance).await?;
    namespaces.extend(instance.applied_target_namespaces());
    // Invalid spec entries never produced objects
    namespaces.extend(instance.target_namespaces().unwrap_or_default());
    Ok(namespaces)
}

/// Delete cross-namespace objects, then release the finalizer
pub async fn teardown(
    applier: &ResourceApplier<'_>,
    instance: &Instance,
) -> Result<Action, ReconcileError> {
    if !instance.has_finalizer(FINALIZER) {
        return Ok(Action::await_change());
    }
    let log = applier.log();
    let shared = Ownership::labelled_for(instance);

    let namespaces = known_namespaces(applier, instance).await?;
    for namespace in &namespaces {
        remove_namespace(applier, instance, namespace).await?;
    }
    let cluster_binding = cluster_binding_key(instance);
    applier.delete(&cluster_binding, &shared).await?;

    let mut keys: Vec<ObjectKey> = namespaces
        .iter()
        .flat_map(|ns| namespace_object_keys(instance, ns))
        .collect();
    keys.push(cluster_binding);

    for key in &keys {
        let live = applier
            .api()
            .get(key)
            .await
            .map_err(|e| ReconcileError::api("get", key, e))?;
        // Objects of another installation were retained and do not block us
        if live.is_some_and(|object| shared.foreign_owner(object.meta()).is_none()) {
            info!(parent: log, object = %key, "waiting for object to be deleted");
            metrics::increment_requeues_total("teardown_pending");
            return Ok(Action::requeue(TEARDOWN_RETRY_INTERVAL));
        }
    }

    let finalizers: Vec<String> = instance
        .finalizers()
        .into_iter()
        .filter(|f| f != FINALIZER)
        .collect();
    applier
        .api()
        .patch_finalizers(instance.handle(), &finalizers)
        .await
        .map_err(|source| ReconcileError::InstanceUpdate {
            instance: instance.display_name(),
            source,
        })?;
    info!(parent: log, namespaces = ?namespaces, "teardown complete, finalizer removed");
    Ok(Action::await_change())
}

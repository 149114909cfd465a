//! # Lock Marker
//!
//! ConfigMap in the install namespace that claims the installation name and
//! records every namespace that may hold cross-namespace objects.
//!
//! The record is written ahead of any namespace-scoped change as the union of
//! the status set, the previously recorded set and the new target set. It is
//! only narrowed to the target set after status has been persisted, so a
//! failed status write never hides a namespace from cleanup.

use crate::controller::applier::{Ownership, ResourceApplier};
use crate::controller::error::ReconcileError;
use crate::controller::resources::{ObjectKey, ResourceKind, TypedObject};
use crate::desired::{storage, Names};
use crate::instance::Instance;
use k8s_openapi::api::core::v1::ConfigMap;
use std::collections::BTreeSet;

/// Namespaces recorded in the live lock marker, empty when there is none
pub async fn recorded(
    applier: &ResourceApplier<'_>,
    instance: &Instance,
) -> Result<BTreeSet<String>, ReconcileError> {
    let key = ObjectKey::namespaced(
        ResourceKind::ConfigMap,
        instance.install_namespace(),
        &Names::new(instance).lock(),
    );
    let live = applier
        .api()
        .get(&key)
        .await
        .map_err(|e| ReconcileError::api("get", &key, e))?;
    Ok(live
        .and_then(ConfigMap::from_managed)
        .map(|lock| storage::recorded_namespaces(&lock))
        .unwrap_or_default())
}

/// Write the union of known namespaces and return it
///
/// Fails with an ownership conflict when another installation holds the lock.
pub async fn record(
    applier: &ResourceApplier<'_>,
    instance: &Instance,
    targets: &[String],
) -> Result<BTreeSet<String>, ReconcileError> {
    let mut namespaces = recorded(applier, instance).await?;
    namespaces.extend(instance.applied_target_namespaces());
    namespaces.extend(targets.iter().cloned());

    let owner = Ownership::controller_of(instance)?;
    applier
        .apply(storage::lock_marker(instance, &namespaces).into(), &owner)
        .await?;
    Ok(namespaces)
}

/// Narrow the record to the current target set
pub async fn prune(
    applier: &ResourceApplier<'_>,
    instance: &Instance,
    targets: &[String],
) -> Result<(), ReconcileError> {
    let namespaces: BTreeSet<String> = targets.iter().cloned().collect();
    let owner = Ownership::controller_of(instance)?;
    applier
        .apply(storage::lock_marker(instance, &namespaces).into(), &owner)
        .await?;
    Ok(())
}

//! # Workload Convergence
//!
//! Applies component workloads and recovers from immutable-field conflicts.
//!
//! A Deployment's pod selector cannot change once created; neither can a
//! binding's roleRef. When the desired object differs in such a field the
//! merge reports it and the object is deleted and created again from the
//! desired spec. Everything else (replicas, strategy, pod template) is simply
//! overwritten on every pass.

use crate::config::ImageSet;
use crate::controller::applier::{Applied, Ownership, ResourceApplier};
use crate::controller::conditions::Component;
use crate::controller::error::ReconcileError;
use crate::controller::resources::{ManagedObject, ObjectKey, ResourceKind};
use crate::controller::tls::TlsConfig;
use crate::desired::{workloads, Names};
use crate::instance::Instance;
use crate::observability::metrics;
use tracing::warn;

/// Apply `desired`, deleting and recreating the live object when an
/// immutable field differs
pub async fn converge(
    applier: &ResourceApplier<'_>,
    desired: ManagedObject,
    ownership: &Ownership,
) -> Result<Applied, ReconcileError> {
    match applier.apply(desired.clone(), ownership).await {
        Err(ReconcileError::Merge { key, source }) if source.requires_recreate() => {
            warn!(
                parent: applier.log(),
                object = %key,
                reason = %source,
                "immutable field changed, recreating"
            );
            metrics::increment_workload_recreations(key.kind.as_str());
            applier.delete(&key, ownership).await?;
            applier.apply(desired, ownership).await
        }
        other => other,
    }
}

/// Converge the Deployment and Service of one component
pub async fn converge_component(
    applier: &ResourceApplier<'_>,
    instance: &Instance,
    component: Component,
    images: &ImageSet,
    tls: Option<&TlsConfig>,
) -> Result<Applied, ReconcileError> {
    let owner = Ownership::controller_of(instance)?;
    applier
        .apply(
            workloads::service(instance, component, tls.is_some()).into(),
            &owner,
        )
        .await?;
    converge(
        applier,
        workloads::deployment(instance, component, images, tls).into(),
        &owner,
    )
    .await
}

/// Remove the Deployment and Service of a component that is no longer wanted
pub async fn remove_component(
    applier: &ResourceApplier<'_>,
    instance: &Instance,
    component: Component,
) -> Result<(), ReconcileError> {
    let owner = Ownership::controller_of(instance)?;
    let name = Names::new(instance).workload(component);
    for kind in [ResourceKind::Deployment, ResourceKind::Service] {
        let key = ObjectKey::namespaced(kind, instance.install_namespace(), &name);
        applier.delete(&key, &owner).await?;
    }
    Ok(())
}

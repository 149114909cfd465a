//! Finalizer teardown and isolation between installations.

mod common;

use common::{cluster_installation, installation, mark_deleted, reconciler, spec, FakeCluster};
use installation_controller::config::Platform;
use installation_controller::constants::{FINALIZER, TEARDOWN_RETRY_INTERVAL};
use installation_controller::controller::conflict::REASON_OWNERSHIP_CONFLICT;
use installation_controller::controller::error::ReconcileError;
use installation_controller::controller::resources::{ObjectKey, ResourceKind};
use installation_controller::desired::Names;
use installation_controller::runtime::error_policy::log_controller_result;
use installation_controller::Installation;
use kube_runtime::controller::{self, Action};
use kube_runtime::reflector::ObjectRef;
use std::time::Duration;

#[tokio::test]
async fn test_finalizer_is_released_after_cross_namespace_cleanup() {
    let cluster = FakeCluster::new();
    let reconciler = reconciler(&cluster, Platform::Kubernetes);
    let mut cr = installation("obs", "obs-system", spec(&["ns1", "ns2"], true));

    reconciler.reconcile(cluster.refresh(&cr)).await.unwrap();
    let names = Names::new(&cluster.refresh(&cr));
    assert!(cluster.cluster_object_exists(ResourceKind::ClusterRoleBinding, &names.cluster_binding()));

    mark_deleted(&mut cr);
    cluster.hold_deletions();

    let action = reconciler.reconcile(cluster.refresh(&cr)).await.unwrap();
    assert_eq!(action, Action::requeue(TEARDOWN_RETRY_INTERVAL));
    assert!(cluster
        .stored_finalizers("Installation", "obs-system", "obs")
        .contains(&FINALIZER.to_string()));

    cluster.finish_terminating();
    let action = reconciler.reconcile(cluster.refresh(&cr)).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert!(!cluster
        .stored_finalizers("Installation", "obs-system", "obs")
        .contains(&FINALIZER.to_string()));
    assert_eq!(cluster.keys_in("ns1"), Vec::<ObjectKey>::new());
    assert_eq!(cluster.keys_in("ns2"), Vec::<ObjectKey>::new());
    assert!(!cluster.cluster_object_exists(ResourceKind::ClusterRoleBinding, &names.cluster_binding()));
}

#[tokio::test]
async fn test_teardown_without_finalizer_does_nothing() {
    let cluster = FakeCluster::new();
    let reconciler = reconciler(&cluster, Platform::Kubernetes);
    let mut cr = installation("obs", "obs-system", spec(&["ns1"], false));
    mark_deleted(&mut cr);

    let action = reconciler.reconcile(cluster.refresh(&cr)).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert!(cluster.mutations().is_empty());
}

#[tokio::test]
async fn test_conflicting_installation_leaves_owner_untouched() {
    let cluster = FakeCluster::new();
    let reconciler = reconciler(&cluster, Platform::Kubernetes);
    let owner = installation("obs", "shared", spec(&[], false));
    reconciler.reconcile(cluster.refresh(&owner)).await.unwrap();
    let before = cluster.snapshot();

    let intruder = cluster_installation("obs", "shared", spec(&[], false));
    let err = reconciler
        .reconcile(cluster.refresh_cluster(&intruder))
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::OwnershipConflict { .. }));
    assert_eq!(cluster.snapshot(), before);

    let events = cluster.events_for("ClusterInstallation", "obs");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, REASON_OWNERSHIP_CONFLICT);
    assert!(cluster.events_for("Installation", "obs").is_empty());

    // The owner keeps converging
    reconciler.reconcile(cluster.refresh(&owner)).await.unwrap();
}

#[tokio::test]
async fn test_overlapping_target_namespaces_coexist() {
    let cluster = FakeCluster::new();
    let reconciler = reconciler(&cluster, Platform::Kubernetes);
    let mut a = installation("obs", "team-a", spec(&["shared"], false));
    let b = installation("obs", "team-b", spec(&["shared"], false));

    reconciler.reconcile(cluster.refresh(&a)).await.unwrap();
    reconciler.reconcile(cluster.refresh(&b)).await.unwrap();

    let binding_a = Names::new(&cluster.refresh(&a)).observer_binding();
    let binding_b = Names::new(&cluster.refresh(&b)).observer_binding();
    assert_ne!(binding_a, binding_b);
    assert!(cluster.exists(ResourceKind::RoleBinding, "shared", &binding_a));
    assert!(cluster.exists(ResourceKind::RoleBinding, "shared", &binding_b));

    // Dropping the namespace from one installation keeps the other's binding
    a.spec.target_namespaces = vec![];
    reconciler.reconcile(cluster.refresh(&a)).await.unwrap();

    assert!(!cluster.exists(ResourceKind::RoleBinding, "shared", &binding_a));
    assert!(cluster.exists(ResourceKind::RoleBinding, "shared", &binding_b));
}

#[tokio::test]
async fn test_backoff_is_dropped_once_installation_is_gone() {
    let cluster = FakeCluster::new();
    let reconciler = reconciler(&cluster, Platform::Kubernetes);
    let instance = cluster.refresh(&installation("obs", "obs-system", spec(&[], false)));
    let error = ReconcileError::InvalidSpec("bad namespace".to_string());

    assert_eq!(
        reconciler.error_action(&instance, &error),
        Action::requeue(Duration::from_secs(1))
    );
    assert_eq!(
        reconciler.error_action(&instance, &error),
        Action::requeue(Duration::from_secs(2))
    );

    let gone = ObjectRef::<Installation>::new("obs").within("obs-system").erase();
    log_controller_result::<Installation>(&reconciler, Err(controller::Error::ObjectNotFound(gone)));

    // A new installation with the same name starts from the minimum delay
    assert_eq!(
        reconciler.error_action(&instance, &error),
        Action::requeue(Duration::from_secs(1))
    );
}

//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and controller stream results.

use crate::controller::error::ReconcileError;
use crate::controller::reconciler::Reconciler;
use crate::crd::{ClusterInstallation, Installation};
use crate::instance::Instance;
use kube::Resource;
use kube_runtime::controller::{self, Action};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Backoff for a failed `Installation` pass
pub fn handle_installation_error(
    obj: Arc<Installation>,
    error: &ReconcileError,
    ctx: Arc<Reconciler>,
) -> Action {
    ctx.error_action(&Instance::from_namespaced(obj), error)
}

/// Backoff for a failed `ClusterInstallation` pass
pub fn handle_cluster_installation_error(
    obj: Arc<ClusterInstallation>,
    error: &ReconcileError,
    ctx: Arc<Reconciler>,
) -> Action {
    ctx.error_action(&Instance::from_cluster(obj), error)
}

/// Log one item of a controller's output stream
///
/// Reconcile failures were already logged by the error policy; watch errors
/// are retried by the watcher's own backoff. An object that no longer exists
/// has its error backoff dropped.
pub fn log_controller_result<K>(
    reconciler: &Reconciler,
    result: Result<(ObjectRef<K>, Action), controller::Error<ReconcileError, watcher::Error>>,
) where
    K: Resource<DynamicType = ()>,
{
    match result {
        Ok((object, action)) => {
            debug!(name = %object.name, namespace = ?object.namespace, ?action, "reconciled");
        }
        Err(controller::Error::ReconcilerFailed(err, object)) => {
            debug!(name = %object.name, namespace = ?object.namespace, error = %err, "reconcile failed, backing off");
        }
        Err(controller::Error::ObjectNotFound(object)) => {
            warn!(name = %object.name, namespace = ?object.namespace, "object not found (likely deleted), continuing watch");
            reconciler.forget(&K::kind(&()), object.namespace.as_deref(), &object.name);
        }
        Err(controller::Error::QueueError(err)) => {
            warn!(error = %err, "watch error, the watcher will retry");
        }
        Err(other) => error!(error = %other, "controller stream error"),
    }
}

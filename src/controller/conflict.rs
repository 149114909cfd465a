//! # Ownership Conflicts
//!
//! Reports an apply that hit an object controlled by another installation.
//! Nothing belonging to the other owner is touched; the error is returned
//! unchanged so the normal backoff applies.

use crate::controller::cluster::{ClusterApi, ControllerEvent};
use crate::controller::error::ReconcileError;
use crate::instance::Instance;
use crate::observability::metrics;
use tracing::{warn, Span};

pub const REASON_OWNERSHIP_CONFLICT: &str = "OwnershipConflict";

/// Log and publish a warning event when `error` is an ownership conflict
///
/// Returns the error so the call site can propagate it.
pub async fn report(
    api: &dyn ClusterApi,
    instance: &Instance,
    error: ReconcileError,
    log: &Span,
) -> ReconcileError {
    let ReconcileError::OwnershipConflict { key, owner } = &error else {
        return error;
    };

    warn!(
        parent: log,
        object = %key,
        owner = %owner,
        "{} cannot take {} because it is owned by {}",
        instance.display_name(),
        key,
        owner
    );
    metrics::increment_ownership_conflicts();

    let event = ControllerEvent::warning(
        REASON_OWNERSHIP_CONFLICT,
        "Apply",
        format!(
            "Requested {} in namespace {} is already owned by {}",
            key.name,
            key.namespace.as_deref().unwrap_or("<cluster>"),
            owner
        ),
    );
    if let Err(e) = api.publish_event(&instance.object_ref(), &event).await {
        warn!(parent: log, error = %e, "failed to publish ownership conflict event");
    }
    error
}

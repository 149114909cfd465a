//! # Error Types
//!
//! Errors returned by the cluster API layer and by a reconcile pass.
//!
//! Expected waits (certificate not issued yet, exposure host not assigned yet)
//! are not errors; they are modelled as outcome enums by the components that
//! produce them and turned into a short requeue by the engine.

use crate::controller::merge::MergeError;
use crate::controller::resources::ObjectKey;
use thiserror::Error;

/// Classified cluster API failure
#[derive(Debug, Error)]
pub enum ApiError {
    /// Object does not exist
    #[error("not found")]
    NotFound,
    /// Create raced with another writer
    #[error("already exists")]
    AlreadyExists,
    /// Optimistic concurrency check failed (stale resourceVersion)
    #[error("conflict: {0}")]
    Conflict(String),
    /// Rejected by validation (HTTP 422)
    #[error("invalid: {0}")]
    Invalid(String),
    /// Any other status returned by the API server
    #[error("rejected with HTTP {code}: {message}")]
    Rejected { code: u16, message: String },
    /// Transport, serialization or client-side failure
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<kube::Error> for ApiError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(api_err) => match api_err.code {
                404 => ApiError::NotFound,
                409 if api_err.reason == "AlreadyExists" => ApiError::AlreadyExists,
                409 => ApiError::Conflict(api_err.message.clone()),
                422 => ApiError::Invalid(api_err.message.clone()),
                code => ApiError::Rejected {
                    code,
                    message: api_err.message.clone(),
                },
            },
            other => ApiError::Transport(other.to_string()),
        }
    }
}

/// Failure of a reconcile pass
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A cluster API call failed
    #[error("failed to {action} {key}: {source}")]
    Api {
        action: &'static str,
        key: ObjectKey,
        #[source]
        source: ApiError,
    },

    /// Patching the installation itself (status, finalizers) failed
    #[error("failed to update {instance}: {source}")]
    InstanceUpdate {
        instance: String,
        #[source]
        source: ApiError,
    },

    /// The object exists and is controlled by a different installation
    #[error("{key} is already owned by {owner}")]
    OwnershipConflict { key: ObjectKey, owner: String },

    /// TLS was requested but cert-manager is not installed
    #[error("cert-manager is not installed but TLS is enabled")]
    CertManagerUnavailable,

    /// The installation spec cannot be applied
    #[error("invalid installation spec: {0}")]
    InvalidSpec(String),

    /// Desired and live object could not be merged and recreation was not possible
    #[error("cannot converge {key}: {source}")]
    Merge {
        key: ObjectKey,
        #[source]
        source: MergeError,
    },
}

impl ReconcileError {
    pub fn api(action: &'static str, key: &ObjectKey, source: ApiError) -> Self {
        ReconcileError::Api {
            action,
            key: key.clone(),
            source,
        }
    }

    /// Validation failures the user has to fix, surfaced as warning events
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            ReconcileError::Api {
                source: ApiError::Invalid(_),
                ..
            } | ReconcileError::InvalidSpec(_)
        )
    }

    /// Short reason used for events and metric labels
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileError::Api {
                source: ApiError::Invalid(_),
                ..
            } => "ValidationFailed",
            ReconcileError::Api { .. } => "ApiError",
            ReconcileError::InstanceUpdate { .. } => "StatusUpdateFailed",
            ReconcileError::OwnershipConflict { .. } => "OwnershipConflict",
            ReconcileError::CertManagerUnavailable => "CertManagerUnavailable",
            ReconcileError::InvalidSpec(_) => "InvalidSpec",
            ReconcileError::Merge { .. } => "MergeFailed",
        }
    }
}

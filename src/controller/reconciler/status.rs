//! # Status Persistence
//!
//! Writes the installation status, skipping writes that would not change it
//! so an unchanged installation does not trigger its own watch.

use crate::controller::cluster::ClusterApi;
use crate::controller::error::ReconcileError;
use crate::crd::InstallationStatus;
use crate::instance::Instance;
use tracing::{debug, Span};

/// Current time in the condition timestamp format
pub fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Tracks the last status written during a pass
pub struct StatusWriter<'a> {
    api: &'a dyn ClusterApi,
    instance: &'a Instance,
    written: InstallationStatus,
}

impl<'a> StatusWriter<'a> {
    pub fn new(api: &'a dyn ClusterApi, instance: &'a Instance) -> Self {
        Self {
            api,
            instance,
            written: instance.status().cloned().unwrap_or_default(),
        }
    }

    /// Persist `status` unless it equals the last written one
    pub async fn persist(
        &mut self,
        status: &InstallationStatus,
        log: &Span,
    ) -> Result<(), ReconcileError> {
        if *status == self.written {
            debug!(parent: log, "status unchanged, skipping update");
            return Ok(());
        }
        self.api
            .patch_status(self.instance.handle(), status)
            .await
            .map_err(|source| ReconcileError::InstanceUpdate {
                instance: self.instance.display_name(),
                source,
            })?;
        debug!(parent: log, "status updated");
        self.written = status.clone();
        Ok(())
    }
}

//! # Reconciler
//!
//! Top-level orchestration of one reconcile pass.
//!
//! ```text
//! deleting? -> teardown, remove finalizer, stop
//! ensure finalizer
//! lock marker (write-ahead namespace record)
//! claims -> generated secrets
//! TLS bootstrap | TLS disabled
//! namespace set (RBAC, per-namespace certificates, stale cleanup)
//! exposure (service, ingress or route)
//! images -> report generator -> database, object storage, grafana -> server
//! persist status
//! network policy, prune lock marker
//! project component health, persist status
//! ```
//!
//! A certificate that is not issued yet or an exposure host that is not
//! assigned yet ends the pass early with a short requeue and a condition
//! explaining the wait. Everything else that fails is returned to the
//! runtime, which applies per-resource backoff.
//!
//! ## Sub-modules
//!
//! - `exposure` - service exposure and the resulting URL
//! - `finalizer` - finalizer handling and cross-namespace teardown
//! - `lock` - lock marker with the recorded namespace set
//! - `status` - status persistence

mod exposure;
mod finalizer;
mod lock;
mod status;

pub use exposure::ExposureOutcome;

use crate::config::{ControllerConfig, ImageSet};
use crate::constants::{FINALIZER, RETRY_INTERVAL};
use crate::controller::applier::{Ownership, ResourceApplier};
use crate::controller::backoff::{BackoffTracker, ExponentialBackoff};
use crate::controller::cluster::{ClusterApi, ControllerEvent};
use crate::controller::conditions::{
    self, Component, REASON_ALL_CERTIFICATES_READY, REASON_CERT_MANAGER_DISABLED,
    REASON_CERT_MANAGER_UNAVAILABLE, REASON_HOST_ASSIGNED, REASON_WAITING_FOR_CERTIFICATE,
    REASON_WAITING_FOR_HOST, STATUS_FALSE, STATUS_TRUE, TYPE_EXPOSURE_READY,
    TYPE_TLS_SETUP_COMPLETE,
};
use crate::controller::conflict;
use crate::controller::deployment::{converge_component, remove_component};
use crate::controller::error::ReconcileError;
use crate::controller::namespaces::{self, stale_namespaces};
use crate::controller::resources::{ObjectKey, ResourceKind};
use crate::controller::tls::{self, TlsConfig, TlsOutcome};
use crate::desired::{network, storage, Names};
use crate::instance::Instance;
use crate::observability::metrics;
use kube_runtime::controller::Action;
use status::StatusWriter;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Span};

/// Shared reconcile context
pub struct Reconciler {
    api: Arc<dyn ClusterApi>,
    config: ControllerConfig,
    backoff: BackoffTracker,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(api: Arc<dyn ClusterApi>, config: ControllerConfig) -> Self {
        let backoff = BackoffTracker::new(ExponentialBackoff::new(
            config.backoff_min_secs,
            config.backoff_max_secs,
        ));
        Self {
            api,
            config,
            backoff,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Run one pass for `instance`
    pub async fn reconcile(&self, instance: Instance) -> Result<Action, ReconcileError> {
        let span = info_span!(
            "reconcile",
            kind = instance.kind(),
            name = instance.name(),
            namespace = instance.install_namespace(),
        );
        metrics::increment_reconciliations();
        let started = Instant::now();

        let result = if instance.is_deleting() {
            let applier = ResourceApplier::new(self.api.as_ref(), &span);
            finalizer::teardown(&applier, &instance).await
        } else {
            self.apply(&instance, &span).await
        };
        metrics::observe_reconciliation_duration(started.elapsed().as_secs_f64());

        match result {
            Ok(action) => {
                self.backoff.reset(&backoff_key(&instance));
                Ok(action)
            }
            Err(error) => Err(self.surface(&instance, error, &span).await),
        }
    }

    /// Drop the error backoff of an installation that no longer exists
    pub fn forget(&self, kind: &str, namespace: Option<&str>, name: &str) {
        self.backoff.reset(&object_backoff_key(kind, namespace, name));
    }

    /// Requeue delay after a failed pass
    pub fn error_action(&self, instance: &Instance, error: &ReconcileError) -> Action {
        let (delay, count) = self.backoff.record_error(&backoff_key(instance));
        error!(
            installation = %instance.display_name(),
            error = %error,
            error_count = count,
            retry_in_secs = delay.as_secs(),
            "reconciliation failed"
        );
        metrics::increment_reconciliation_errors(error.reason());
        metrics::increment_requeues_total("error_backoff");
        Action::requeue(delay)
    }

    /// Publish the user-visible side of a failure and hand the error back
    async fn surface(&self, instance: &Instance, error: ReconcileError, log: &Span) -> ReconcileError {
        let api = self.api.as_ref();
        let error = conflict::report(api, instance, error, log).await;
        if error.is_user_facing() {
            let event = ControllerEvent::warning(error.reason(), "Reconcile", error.to_string());
            if let Err(e) = api.publish_event(&instance.object_ref(), &event).await {
                warn!(parent: log, error = %e, "failed to publish event");
            }
        }
        error
    }

    async fn apply(&self, instance: &Instance, log: &Span) -> Result<Action, ReconcileError> {
        let api = self.api.as_ref();
        let applier = ResourceApplier::new(api, log);
        let spec = instance.spec();
        let names = Names::new(instance);
        let install_ns = instance.install_namespace();
        let platform = self.config.platform;

        if !instance.has_finalizer(FINALIZER) {
            finalizer::add(api, instance).await?;
            info!(parent: log, "added finalizer");
        }

        let targets = instance.target_namespaces().map_err(|invalid| {
            ReconcileError::InvalidSpec(format!(
                "target namespaces are not valid namespace names: {}",
                invalid.join(", ")
            ))
        })?;

        let recorded = lock::record(&applier, instance, &targets).await?;
        let stale = stale_namespaces(&recorded, &targets);
        if !stale.is_empty() {
            info!(parent: log, stale = ?stale, "namespaces left the target set");
        }

        let owner = Ownership::controller_of(instance)?;
        applier
            .apply(
                storage::claim(instance, &names.database_claim(), &spec.database).into(),
                &owner,
            )
            .await?;
        applier
            .apply(
                storage::claim(instance, &names.object_storage_claim(), &spec.object_storage).into(),
                &owner,
            )
            .await?;
        applier
            .apply(storage::database_secret(instance).into(), &owner)
            .await?;
        applier
            .apply(storage::object_storage_secret(instance).into(), &owner)
            .await?;

        let now = status::now();
        let mut status = instance.status().cloned().unwrap_or_default();
        let mut writer = StatusWriter::new(api, instance);

        let tls_config = if spec.tls.enabled {
            match tls::bootstrap(&applier, instance, &targets, &stale).await? {
                TlsOutcome::Ready(config) => {
                    conditions::set_condition(
                        &mut status.conditions,
                        TYPE_TLS_SETUP_COMPLETE,
                        STATUS_TRUE,
                        REASON_ALL_CERTIFICATES_READY,
                        "All certificates are issued",
                        &now,
                    );
                    applier
                        .apply(storage::trust_bundle(instance, &config.ca_cert).into(), &owner)
                        .await?;
                    Some(config)
                }
                TlsOutcome::NotReady { certificate } => {
                    conditions::set_condition(
                        &mut status.conditions,
                        TYPE_TLS_SETUP_COMPLETE,
                        STATUS_FALSE,
                        REASON_WAITING_FOR_CERTIFICATE,
                        &format!("Waiting for certificate {certificate} to be issued"),
                        &now,
                    );
                    writer.persist(&status, log).await?;
                    metrics::increment_requeues_total("certificate_not_ready");
                    return Ok(Action::requeue(RETRY_INTERVAL));
                }
                TlsOutcome::Unavailable => {
                    conditions::set_condition(
                        &mut status.conditions,
                        TYPE_TLS_SETUP_COMPLETE,
                        STATUS_FALSE,
                        REASON_CERT_MANAGER_UNAVAILABLE,
                        "TLS is enabled but cert-manager is not installed",
                        &now,
                    );
                    writer.persist(&status, log).await?;
                    return Err(ReconcileError::CertManagerUnavailable);
                }
            }
        } else {
            conditions::set_condition(
                &mut status.conditions,
                TYPE_TLS_SETUP_COMPLETE,
                STATUS_TRUE,
                REASON_CERT_MANAGER_DISABLED,
                "TLS is disabled",
                &now,
            );
            let everywhere: BTreeSet<String> = recorded.iter().chain(&targets).cloned().collect();
            tls::remove_all(&applier, instance, &everywhere).await?;
            None
        };

        namespaces::reconcile(&applier, instance, platform, &targets, &stale).await?;

        let url = match exposure::reconcile(&applier, instance, platform, tls_config.as_ref()).await? {
            ExposureOutcome::Internal { url } => {
                conditions::remove_condition(&mut status.conditions, TYPE_EXPOSURE_READY);
                url
            }
            ExposureOutcome::Ready { url } => {
                conditions::set_condition(
                    &mut status.conditions,
                    TYPE_EXPOSURE_READY,
                    STATUS_TRUE,
                    REASON_HOST_ASSIGNED,
                    &format!("Exposed at {url}"),
                    &now,
                );
                url
            }
            ExposureOutcome::NotReady => {
                conditions::set_condition(
                    &mut status.conditions,
                    TYPE_EXPOSURE_READY,
                    STATUS_FALSE,
                    REASON_WAITING_FOR_HOST,
                    "Waiting for the router to assign a host",
                    &now,
                );
                writer.persist(&status, log).await?;
                metrics::increment_requeues_total("exposure_not_ready");
                return Ok(Action::requeue(RETRY_INTERVAL));
            }
        };

        let images = ImageSet::from_env();
        let tls = tls_config.as_ref();
        self.converge_workloads(&applier, instance, &images, tls)
            .await?;

        status.url = Some(url);
        status.target_namespaces = targets.clone();
        status.database_claim = Some(names.database_claim());
        status.object_storage_claim = Some(names.object_storage_claim());
        status.secrets = managed_secrets(&names, tls);
        status.observed_generation = instance.meta().generation;
        writer.persist(&status, log).await?;

        let policy_key = ObjectKey::namespaced(
            ResourceKind::NetworkPolicy,
            install_ns,
            &names.network_policy(),
        );
        if spec.network_policy.enabled {
            applier
                .apply(
                    network::network_policy(instance, platform, &targets, tls.is_some()).into(),
                    &owner,
                )
                .await?;
        } else {
            applier.delete(&policy_key, &owner).await?;
        }

        lock::prune(&applier, instance, &targets).await?;

        conditions::project_components(api, instance, &mut status.conditions, &now).await?;
        writer.persist(&status, log).await?;

        info!(parent: log, targets = ?targets, "reconciled");
        Ok(Action::requeue(self.config.resync_interval))
    }

    async fn converge_workloads(
        &self,
        applier: &ResourceApplier<'_>,
        instance: &Instance,
        images: &ImageSet,
        tls: Option<&TlsConfig>,
    ) -> Result<(), ReconcileError> {
        let spec = instance.spec();

        if spec.report_generator.replicas > 0 {
            converge_component(applier, instance, Component::ReportGenerator, images, tls).await?;
        } else {
            remove_component(applier, instance, Component::ReportGenerator).await?;
        }

        converge_component(applier, instance, Component::Database, images, tls).await?;
        converge_component(applier, instance, Component::ObjectStorage, images, tls).await?;
        if spec.install_mode.includes_grafana() {
            converge_component(applier, instance, Component::Grafana, images, tls).await?;
        } else {
            remove_component(applier, instance, Component::Grafana).await?;
        }

        converge_component(applier, instance, Component::Server, images, tls).await?;
        Ok(())
    }
}

/// Secrets in the install namespace reported in status
fn managed_secrets(names: &Names, tls: Option<&TlsConfig>) -> Vec<String> {
    let mut secrets = vec![names.database_secret(), names.object_storage_secret()];
    if let Some(tls) = tls {
        secrets.push(tls.keystore_secret.clone());
        secrets.push(tls.ca_secret.clone());
        secrets.push(tls.server_secret.clone());
        secrets.push(tls.reports_secret.clone());
        secrets.extend(tls.grafana_secret.clone());
    }
    secrets
}

fn backoff_key(instance: &Instance) -> String {
    object_backoff_key(instance.kind(), instance.resource_namespace(), instance.name())
}

fn object_backoff_key(kind: &str, namespace: Option<&str>, name: &str) -> String {
    format!("{kind}/{}/{name}", namespace.unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::InstallationSpec;
    use crate::desired::test_support::instance;

    #[test]
    fn test_managed_secrets_follow_tls() {
        let instance = instance(InstallationSpec::default());
        let names = Names::new(&instance);
        assert_eq!(
            managed_secrets(&names, None),
            vec!["obs-database-credentials", "obs-object-storage-credentials"]
        );

        let tls = TlsConfig {
            server_secret: "s".to_string(),
            reports_secret: "r".to_string(),
            grafana_secret: None,
            keystore_secret: "k".to_string(),
            ca_secret: "c".to_string(),
            trust_bundle: "b".to_string(),
            ca_cert: Vec::new(),
        };
        assert_eq!(managed_secrets(&names, Some(&tls)).len(), 6);
    }

    #[test]
    fn test_backoff_key_distinguishes_kinds() {
        let instance = instance(InstallationSpec::default());
        assert_eq!(backoff_key(&instance), "Installation/obs-system/obs");
    }
}

//! # TLS Bootstrap
//!
//! Drives the cert-manager issuer chain for one installation.
//!
//! ```text
//! self-signed Issuer -> CA Certificate -> CA Issuer -> leaf Certificates
//! ```
//!
//! Each pass re-applies the whole chain, then reads back the certificates.
//! cert-manager issues asynchronously, so a certificate that is not ready yet
//! is an expected outcome ([`TlsOutcome::NotReady`]), not an error. Once
//! everything is issued the backing secrets are adopted and the CA bytes are
//! returned in a [`TlsConfig`] for the workload builders.
//!
//! Every certificate, agent certificates included, is issued in the install
//! namespace. A target namespace receives the public CA certificate and its
//! agent key pair, never the CA key.

use crate::controller::applier::{Ownership, ResourceApplier};
use crate::controller::cluster::ControllerEvent;
use crate::controller::conditions::{Component, REASON_CERT_MANAGER_UNAVAILABLE};
use crate::controller::error::ReconcileError;
use crate::controller::resources::{ObjectKey, ResourceKind, TypedObject};
use crate::crd::cert_manager::Certificate;
use crate::desired::certificates::{self, CA_CERT_KEY};
use crate::desired::{storage, Names};
use crate::instance::Instance;
use k8s_openapi::api::core::v1::Secret;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

const LEAVES: [Component; 3] = [Component::Server, Component::ReportGenerator, Component::Grafana];

/// TLS material for one pass; rebuilt every pass and never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub server_secret: String,
    pub reports_secret: String,
    /// Only set for full installs
    pub grafana_secret: Option<String>,
    pub keystore_secret: String,
    pub ca_secret: String,
    /// ConfigMap with the CA certificate; the only CA material pods mount
    pub trust_bundle: String,
    pub ca_cert: Vec<u8>,
}

impl TlsConfig {
    /// Hex SHA-256 of the CA certificate
    pub fn ca_digest(&self) -> String {
        Sha256::digest(&self.ca_cert)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// Result of a bootstrap pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsOutcome {
    Ready(TlsConfig),
    /// cert-manager has not issued `certificate` yet
    NotReady { certificate: String },
    /// cert-manager is not installed
    Unavailable,
}

/// Run the bootstrap state machine
///
/// `stale` lists namespaces that left the target set; their agent
/// certificates and published copies are removed.
pub async fn bootstrap(
    applier: &ResourceApplier<'_>,
    instance: &Instance,
    targets: &[String],
    stale: &BTreeSet<String>,
) -> Result<TlsOutcome, ReconcileError> {
    let api = applier.api();
    let log = applier.log();
    let names = Names::new(instance);
    let ns = instance.install_namespace();

    let installed = api
        .cert_manager_installed()
        .await
        .map_err(|e| ReconcileError::api("discover", &crd_key(), e))?;
    if !installed {
        warn!(parent: log, "cert-manager is not installed, cannot issue certificates");
        let event = ControllerEvent::warning(
            REASON_CERT_MANAGER_UNAVAILABLE,
            "BootstrapTLS",
            "TLS is enabled but cert-manager is not installed in the cluster",
        );
        if let Err(e) = api.publish_event(&instance.object_ref(), &event).await {
            warn!(parent: log, error = %e, "failed to publish event");
        }
        return Ok(TlsOutcome::Unavailable);
    }

    let owner = Ownership::controller_of(instance)?;

    applier
        .apply(certificates::selfsigned_issuer(instance).into(), &owner)
        .await?;
    let ca = applier
        .apply(certificates::ca_certificate(instance).into(), &owner)
        .await?;
    applier
        .apply(certificates::ca_issuer(instance).into(), &owner)
        .await?;
    applier
        .apply(storage::keystore_secret(instance).into(), &owner)
        .await?;

    let mut leaves = vec![Component::Server, Component::ReportGenerator];
    if instance.spec().install_mode.includes_grafana() {
        leaves.push(Component::Grafana);
    } else {
        remove_certificate(applier, instance, &names.leaf_certificate(Component::Grafana), &owner)
            .await?;
    }
    let agents: Vec<&str> = targets
        .iter()
        .map(String::as_str)
        .filter(|t| *t != ns)
        .collect();

    let mut issued = vec![ca.object];
    for component in &leaves {
        let applied = applier
            .apply(certificates::leaf_certificate(instance, *component).into(), &owner)
            .await?;
        issued.push(applied.object);
    }
    for target in &agents {
        let applied = applier
            .apply(certificates::agent_certificate(instance, target).into(), &owner)
            .await?;
        issued.push(applied.object);
    }
    for namespace in stale {
        remove_certificate(applier, instance, &names.agent_certificate(namespace), &owner).await?;
    }

    // Everything must be issued before any secret is consumed
    for object in issued {
        let Some(certificate) = Certificate::from_managed(object) else {
            continue;
        };
        if !certificate.is_ready() {
            let name = certificate.metadata.name.unwrap_or_default();
            info!(parent: log, certificate = %name, "waiting for certificate to be issued");
            return Ok(TlsOutcome::NotReady { certificate: name });
        }
    }

    let mut secret_names = vec![(names.ca_secret(), None)];
    secret_names.extend(leaves.iter().map(|c| (names.leaf_certificate(*c), None)));
    secret_names.extend(agents.iter().map(|t| (names.agent_certificate(t), Some(*t))));

    let mut ca_secret = None;
    let mut agent_secrets = BTreeMap::new();
    for (secret_name, agent_namespace) in secret_names {
        let key = ObjectKey::namespaced(ResourceKind::Secret, ns, &secret_name);
        let adopted = applier
            .adopt(&key, &owner, &instance.labels())
            .await?
            .and_then(|applied| Secret::from_managed(applied.object));
        let Some(secret) = adopted else {
            // Ready was reported before the secret became visible to us
            return Ok(TlsOutcome::NotReady {
                certificate: secret_name,
            });
        };
        match agent_namespace {
            Some(target) => {
                agent_secrets.insert(target, secret);
            }
            None if secret_name == names.ca_secret() => ca_secret = Some(secret),
            None => {}
        }
    }
    let Some(ca_secret) = ca_secret else {
        return Ok(TlsOutcome::NotReady {
            certificate: names.ca_certificate(),
        });
    };

    let ca_cert = ca_secret
        .data
        .as_ref()
        .and_then(|d| d.get(CA_CERT_KEY).or_else(|| d.get("tls.crt")))
        .map(|b| b.0.clone())
        .unwrap_or_default();

    let copies = Ownership::labelled_for(instance);
    for (target, issued) in &agent_secrets {
        applier
            .apply(certificates::ca_copy(instance, &ca_cert, target).into(), &copies)
            .await?;
        applier
            .apply(
                certificates::agent_secret_copy(instance, issued, &ca_cert, target).into(),
                &copies,
            )
            .await?;
    }
    remove_published(applier, instance, stale).await?;

    Ok(TlsOutcome::Ready(TlsConfig {
        server_secret: names.leaf_certificate(Component::Server),
        reports_secret: names.leaf_certificate(Component::ReportGenerator),
        grafana_secret: instance
            .spec()
            .install_mode
            .includes_grafana()
            .then(|| names.leaf_certificate(Component::Grafana)),
        keystore_secret: names.keystore_secret(),
        ca_secret: names.ca_secret(),
        trust_bundle: names.trust_bundle(),
        ca_cert,
    }))
}

/// Delete the CA certificate and agent copies published into `namespaces`
///
/// The install namespace never holds a copy and is skipped.
pub async fn remove_published(
    applier: &ResourceApplier<'_>,
    instance: &Instance,
    namespaces: &BTreeSet<String>,
) -> Result<(), ReconcileError> {
    let names = Names::new(instance);
    let ownership = Ownership::labelled_for(instance);
    for namespace in namespaces
        .iter()
        .filter(|n| n.as_str() != instance.install_namespace())
    {
        for name in [names.ca_copy(), names.agent_secret()] {
            let key = ObjectKey::namespaced(ResourceKind::Secret, namespace, &name);
            applier.delete(&key, &ownership).await?;
        }
    }
    Ok(())
}

/// Remove every TLS object of the installation after TLS was switched off
///
/// `namespaces` are all namespaces that may hold published copies or have
/// an agent certificate in the install namespace.
pub async fn remove_all(
    applier: &ResourceApplier<'_>,
    instance: &Instance,
    namespaces: &BTreeSet<String>,
) -> Result<(), ReconcileError> {
    remove_published(applier, instance, namespaces).await?;

    let names = Names::new(instance);
    let owner = Ownership::controller_of(instance)?;
    let ns = instance.install_namespace();

    let mut issued: Vec<String> = LEAVES.iter().map(|c| names.leaf_certificate(*c)).collect();
    issued.extend(namespaces.iter().map(|n| names.agent_certificate(n)));
    for name in &issued {
        remove_certificate(applier, instance, name, &owner).await?;
    }

    let chain = [
        ObjectKey::namespaced(ResourceKind::Issuer, ns, &names.ca_issuer()),
        ObjectKey::namespaced(ResourceKind::Certificate, ns, &names.ca_certificate()),
        ObjectKey::namespaced(ResourceKind::Secret, ns, &names.ca_secret()),
        ObjectKey::namespaced(ResourceKind::Issuer, ns, &names.selfsigned_issuer()),
        ObjectKey::namespaced(ResourceKind::Secret, ns, &names.keystore_secret()),
        ObjectKey::namespaced(ResourceKind::ConfigMap, ns, &names.trust_bundle()),
    ];
    for key in &chain {
        applier.delete(key, &owner).await?;
    }
    Ok(())
}

/// Delete a certificate in the install namespace and its backing secret
async fn remove_certificate(
    applier: &ResourceApplier<'_>,
    instance: &Instance,
    name: &str,
    owner: &Ownership,
) -> Result<(), ReconcileError> {
    let ns = instance.install_namespace();
    for kind in [ResourceKind::Certificate, ResourceKind::Secret] {
        applier
            .delete(&ObjectKey::namespaced(kind, ns, name), owner)
            .await?;
    }
    Ok(())
}

fn crd_key() -> ObjectKey {
    ObjectKey::cluster(ResourceKind::Certificate, "certificates.cert-manager.io")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ca_digest_is_stable_and_content_addressed() {
        let config = |ca: &[u8]| TlsConfig {
            server_secret: String::new(),
            reports_secret: String::new(),
            grafana_secret: None,
            keystore_secret: String::new(),
            ca_secret: String::new(),
            trust_bundle: String::new(),
            ca_cert: ca.to_vec(),
        };
        let a = config(b"first").ca_digest();
        assert_eq!(a.len(), 64);
        assert_eq!(a, config(b"first").ca_digest());
        assert_ne!(a, config(b"second").ca_digest());
    }
}

//! # Exposure
//!
//! Service exposure of the main component and the URL reported in status.
//!
//! | type    | object  | ready when                          |
//! |---------|---------|-------------------------------------|
//! | None    | -       | always, cluster-internal URL        |
//! | Ingress | Ingress | always, host from `exposure.host`   |
//! | Route   | Route   | a router admitted a host            |
//!
//! The object of the other type is removed when the type changes.

use crate::config::Platform;
use crate::controller::applier::{Ownership, ResourceApplier};
use crate::controller::conditions::Component;
use crate::controller::error::ReconcileError;
use crate::controller::resources::{ObjectKey, ResourceKind, TypedObject};
use crate::controller::tls::TlsConfig;
use crate::crd::route::Route;
use crate::crd::ExposureType;
use crate::desired::workloads::{component_port, service};
use crate::desired::{network, Names};
use crate::instance::Instance;
use tracing::info;

/// Result of the exposure phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExposureOutcome {
    /// No external exposure requested
    Internal { url: String },
    /// Exposed at an external host
    Ready { url: String },
    /// The router has not assigned a host yet
    NotReady,
}

fn scheme(tls: bool) -> &'static str {
    if tls {
        "https"
    } else {
        "http"
    }
}

/// Apply the main service and its exposure object
pub async fn reconcile(
    applier: &ResourceApplier<'_>,
    instance: &Instance,
    platform: Platform,
    tls: Option<&TlsConfig>,
) -> Result<ExposureOutcome, ReconcileError> {
    let owner = Ownership::controller_of(instance)?;
    let names = Names::new(instance);
    let ns = instance.install_namespace();
    let exposure = &instance.spec().exposure;
    let server = names.workload(Component::Server);

    applier
        .apply(service(instance, Component::Server, tls.is_some()).into(), &owner)
        .await?;

    let ingress_key = ObjectKey::namespaced(ResourceKind::Ingress, ns, &server);
    let route_key = ObjectKey::namespaced(ResourceKind::Route, ns, &server);

    match exposure.type_ {
        ExposureType::None => {
            applier.delete(&ingress_key, &owner).await?;
            if platform == Platform::OpenShift {
                applier.delete(&route_key, &owner).await?;
            }
            let (_, port) = component_port(Component::Server, tls.is_some());
            Ok(ExposureOutcome::Internal {
                url: format!("{}://{server}.{ns}.svc:{port}", scheme(tls.is_some())),
            })
        }
        ExposureType::Ingress => {
            let host = exposure.host.as_deref().ok_or_else(|| {
                ReconcileError::InvalidSpec("exposure.host is required for Ingress".to_string())
            })?;
            if platform == Platform::OpenShift {
                applier.delete(&route_key, &owner).await?;
            }
            let tls_secret = tls.map(|t| t.server_secret.as_str());
            applier
                .apply(network::ingress(instance, host, tls_secret).into(), &owner)
                .await?;
            Ok(ExposureOutcome::Ready {
                url: format!("{}://{host}", scheme(tls.is_some())),
            })
        }
        ExposureType::Route => {
            if platform != Platform::OpenShift {
                return Err(ReconcileError::InvalidSpec(
                    "exposure type Route requires the OpenShift platform".to_string(),
                ));
            }
            applier.delete(&ingress_key, &owner).await?;
            let applied = applier
                .apply(network::route(instance, tls.is_some()).into(), &owner)
                .await?;
            let host = Route::from_managed(applied.object).and_then(|r| r.admitted_host());
            match host {
                // Routes always terminate TLS at the router
                Some(host) => Ok(ExposureOutcome::Ready {
                    url: format!("https://{host}"),
                }),
                None => {
                    info!(parent: applier.log(), route = %route_key, "waiting for route host");
                    Ok(ExposureOutcome::NotReady)
                }
            }
        }
    }
}

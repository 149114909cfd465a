//! # Installation Controller
//!
//! A Kubernetes controller that installs a multi-component application
//! (main service, database, object storage, report generator, Grafana) from an
//! `Installation` or `ClusterInstallation` resource.
//!
//! ## Overview
//!
//! Every reconcile pass:
//!
//! 1. **Claims the installation** - lock marker recording every namespace touched
//! 2. **Provisions storage** - claims and generated credentials
//! 3. **Bootstraps TLS** - cert-manager issuer chain, CA copies per target namespace
//! 4. **Grants access** - RBAC in every target namespace plus one cluster binding
//! 5. **Exposes the service** - Ingress or OpenShift Route
//! 6. **Runs the workloads** - deployments, recreated when an immutable field changes
//! 7. **Reports health** - status URL, namespaces and mirrored deployment conditions
//!
//! Deleting an installation removes everything outside the install namespace
//! before the finalizer is released.

use anyhow::Result;
use installation_controller::config::load_config;
use installation_controller::runtime::initialization::initialize;
use installation_controller::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let (controller_config, server_config) = load_config();

    let init_result = initialize(controller_config, &server_config).await?;

    run_watch_loop(
        init_result.client,
        init_result.reconciler,
        init_result.server_state,
    )
    .await
}

//! # Watch Loop
//!
//! Runs one controller per custom resource kind on the shared reconciler.
//!
//! `Installation` children carry a controller owner reference in the same
//! namespace and are watched with `owns`. `ClusterInstallation` is
//! cluster-scoped, so its namespaced children are mapped back to the owner
//! through their owner reference.

use super::error_policy::{
    handle_cluster_installation_error, handle_installation_error, log_controller_result,
};
use crate::constants::{LABEL_MANAGED_BY, MANAGED_BY_VALUE};
use crate::controller::error::ReconcileError;
use crate::controller::reconciler::Reconciler;
use crate::controller::server::ServerState;
use crate::crd::{ClusterInstallation, Installation};
use crate::instance::Instance;
use anyhow::Result;
use futures::{future, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use kube::api::Api;
use kube::{Client, Resource, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerSettings, Controller};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use std::sync::Arc;
use tracing::info;

async fn reconcile_installation(
    obj: Arc<Installation>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcileError> {
    ctx.reconcile(Instance::from_namespaced(obj)).await
}

async fn reconcile_cluster_installation(
    obj: Arc<ClusterInstallation>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcileError> {
    ctx.reconcile(Instance::from_cluster(obj)).await
}

/// Children created by this controller
fn children() -> watcher::Config {
    watcher::Config::default().labels(&format!("{LABEL_MANAGED_BY}={MANAGED_BY_VALUE}"))
}

/// Owning `ClusterInstallation` of a namespaced child
fn cluster_owner<K: Resource>(child: K) -> Option<ObjectRef<ClusterInstallation>> {
    child
        .owner_references()
        .iter()
        .find(|r| r.controller == Some(true) && r.kind == "ClusterInstallation")
        .map(|r| ObjectRef::new(&r.name))
}

/// Run both controllers until a shutdown signal arrives
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<()> {
    let config = reconciler.config().clone();
    let settings = ControllerSettings::default().concurrency(config.concurrency);

    let (installations, deployments, services, claims) = match &config.watch_namespace {
        Some(ns) => {
            info!(namespace = %ns, "watching installations in one namespace");
            (
                Api::<Installation>::namespaced(client.clone(), ns),
                Api::<Deployment>::namespaced(client.clone(), ns),
                Api::<Service>::namespaced(client.clone(), ns),
                Api::<PersistentVolumeClaim>::namespaced(client.clone(), ns),
            )
        }
        None => (
            Api::all(client.clone()),
            Api::all(client.clone()),
            Api::all(client.clone()),
            Api::all(client.clone()),
        ),
    };

    let namespaced = Controller::new(installations, watcher::Config::default())
        .owns(deployments, children())
        .owns(services, children())
        .owns(claims, children())
        .with_config(settings.clone())
        .shutdown_on_signal()
        .run(
            reconcile_installation,
            handle_installation_error,
            Arc::clone(&reconciler),
        )
        .for_each(|result| {
            log_controller_result(&reconciler, result);
            future::ready(())
        });

    let cluster = Controller::new(
        Api::<ClusterInstallation>::all(client.clone()),
        watcher::Config::default(),
    )
    .watches(
        Api::<Deployment>::all(client.clone()),
        children(),
        cluster_owner::<Deployment>,
    )
    .watches(
        Api::<Service>::all(client.clone()),
        children(),
        cluster_owner::<Service>,
    )
    .watches(
        Api::<PersistentVolumeClaim>::all(client.clone()),
        children(),
        cluster_owner::<PersistentVolumeClaim>,
    )
    .with_config(settings)
    .shutdown_on_signal()
    .run(
        reconcile_cluster_installation,
        handle_cluster_installation_error,
        Arc::clone(&reconciler),
    )
    .for_each(|result| {
        log_controller_result(&reconciler, result);
        future::ready(())
    });

    info!("controllers started");
    tokio::join!(namespaced, cluster);

    server_state
        .is_ready
        .store(false, std::sync::atomic::Ordering::Relaxed);
    info!("controllers stopped");
    Ok(())
}

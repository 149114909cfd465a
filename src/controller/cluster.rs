//! # Cluster API
//!
//! Narrow interface over the Kubernetes API used by every reconcile component.
//!
//! [`ClusterApi`] is the only way the reconciler reads or writes cluster
//! state. [`KubeClusterApi`] implements it with a `kube::Client`, dispatching
//! each [`ResourceKind`] to its typed `Api<K>`.

use crate::constants::FIELD_MANAGER;
use crate::controller::error::ApiError;
use crate::controller::resources::{ManagedObject, ObjectKey, ResourceKind};
use crate::crd::cert_manager::{Certificate, Issuer};
use crate::crd::route::Route;
use crate::crd::{ClusterInstallation, Installation, InstallationStatus};
use crate::instance::InstanceHandle;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMap, ObjectReference, PersistentVolumeClaim, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Name of the CRD whose presence means cert-manager is installed
const CERT_MANAGER_CRD: &str = "certificates.cert-manager.io";

/// Result of a delete call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The object did not exist; treated as success
    AlreadyGone,
    /// The object belongs to another instance and was left in place
    ///
    /// Only produced by the applier, never by a [`ClusterApi`] implementation.
    Retained,
}

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
    Normal,
    Warning,
}

/// Event published against an installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerEvent {
    pub severity: EventSeverity,
    pub reason: String,
    pub note: String,
    pub action: String,
}

impl ControllerEvent {
    pub fn warning(reason: &str, action: &str, note: impl Into<String>) -> Self {
        Self {
            severity: EventSeverity::Warning,
            reason: reason.to_string(),
            note: note.into(),
            action: action.to_string(),
        }
    }

    pub fn normal(reason: &str, action: &str, note: impl Into<String>) -> Self {
        Self {
            severity: EventSeverity::Normal,
            reason: reason.to_string(),
            note: note.into(),
            action: action.to_string(),
        }
    }
}

/// Cluster operations needed by a reconcile pass
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetch an object; `None` when it does not exist
    async fn get(&self, key: &ObjectKey) -> Result<Option<ManagedObject>, ApiError>;

    /// Create an object, returning the stored version
    async fn create(&self, object: &ManagedObject) -> Result<ManagedObject, ApiError>;

    /// Replace an object; the object's resourceVersion is checked by the server
    async fn replace(&self, object: &ManagedObject) -> Result<ManagedObject, ApiError>;

    /// Delete an object
    async fn delete(&self, key: &ObjectKey) -> Result<DeleteOutcome, ApiError>;

    /// Whether the cert-manager CRDs are installed
    async fn cert_manager_installed(&self) -> Result<bool, ApiError>;

    /// Replace the status subresource of an installation
    async fn patch_status(
        &self,
        instance: &InstanceHandle,
        status: &InstallationStatus,
    ) -> Result<(), ApiError>;

    /// Set the finalizer list of an installation
    async fn patch_finalizers(
        &self,
        instance: &InstanceHandle,
        finalizers: &[String],
    ) -> Result<(), ApiError>;

    /// Publish an event regarding an installation
    async fn publish_event(
        &self,
        regarding: &ObjectReference,
        event: &ControllerEvent,
    ) -> Result<(), ApiError>;
}

/// [`ClusterApi`] backed by a `kube::Client`
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
    recorder: Recorder,
}

impl std::fmt::Debug for KubeClusterApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterApi").finish_non_exhaustive()
    }
}

impl KubeClusterApi {
    pub fn new(client: Client, reporter_name: &str) -> Self {
        let reporter = Reporter {
            controller: reporter_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        let recorder = Recorder::new(client.clone(), reporter);
        Self { client, recorder }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }

    fn namespaced<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace.unwrap_or("default"))
    }
}

async fn get_opt<K>(api: Api<K>, name: &str) -> Result<Option<K>, ApiError>
where
    K: Clone + DeserializeOwned + Debug,
{
    api.get_opt(name).await.map_err(ApiError::from)
}

async fn create_in<K>(api: Api<K>, object: &K) -> Result<K, ApiError>
where
    K: Clone + DeserializeOwned + Serialize + Debug,
{
    api.create(&KubeClusterApi::post_params(), object)
        .await
        .map_err(ApiError::from)
}

async fn replace_in<K>(api: Api<K>, object: &K) -> Result<K, ApiError>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    let name = object.name_any();
    api.replace(&name, &KubeClusterApi::post_params(), object)
        .await
        .map_err(ApiError::from)
}

async fn delete_in<K>(api: Api<K>, name: &str) -> Result<DeleteOutcome, ApiError>
where
    K: Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::background()).await {
        Ok(_) => Ok(DeleteOutcome::Deleted),
        Err(e) => match ApiError::from(e) {
            ApiError::NotFound => Ok(DeleteOutcome::AlreadyGone),
            other => Err(other),
        },
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get(&self, key: &ObjectKey) -> Result<Option<ManagedObject>, ApiError> {
        let ns = key.namespace.as_deref();
        let name = key.name.as_str();
        let object = match key.kind {
            ResourceKind::ConfigMap => get_opt::<ConfigMap>(self.namespaced(ns), name)
                .await?
                .map(ManagedObject::from),
            ResourceKind::Secret => get_opt::<Secret>(self.namespaced(ns), name)
                .await?
                .map(ManagedObject::from),
            ResourceKind::Service => get_opt::<Service>(self.namespaced(ns), name)
                .await?
                .map(ManagedObject::from),
            ResourceKind::Ingress => get_opt::<Ingress>(self.namespaced(ns), name)
                .await?
                .map(ManagedObject::from),
            ResourceKind::Route => get_opt::<Route>(self.namespaced(ns), name)
                .await?
                .map(ManagedObject::from),
            ResourceKind::NetworkPolicy => get_opt::<NetworkPolicy>(self.namespaced(ns), name)
                .await?
                .map(ManagedObject::from),
            ResourceKind::PersistentVolumeClaim => {
                get_opt::<PersistentVolumeClaim>(self.namespaced(ns), name)
                    .await?
                    .map(ManagedObject::from)
            }
            ResourceKind::ServiceAccount => get_opt::<ServiceAccount>(self.namespaced(ns), name)
                .await?
                .map(ManagedObject::from),
            ResourceKind::Role => get_opt::<Role>(self.namespaced(ns), name)
                .await?
                .map(ManagedObject::from),
            ResourceKind::RoleBinding => get_opt::<RoleBinding>(self.namespaced(ns), name)
                .await?
                .map(ManagedObject::from),
            ResourceKind::ClusterRoleBinding => {
                get_opt::<ClusterRoleBinding>(Api::all(self.client.clone()), name)
                    .await?
                    .map(ManagedObject::from)
            }
            ResourceKind::Issuer => get_opt::<Issuer>(self.namespaced(ns), name)
                .await?
                .map(ManagedObject::from),
            ResourceKind::Certificate => get_opt::<Certificate>(self.namespaced(ns), name)
                .await?
                .map(ManagedObject::from),
            ResourceKind::Deployment => get_opt::<Deployment>(self.namespaced(ns), name)
                .await?
                .map(ManagedObject::from),
        };
        Ok(object)
    }

    async fn create(&self, object: &ManagedObject) -> Result<ManagedObject, ApiError> {
        let ns = object.meta().namespace.as_deref();
        let created = match object {
            ManagedObject::ConfigMap(o) => create_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::Secret(o) => create_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::Service(o) => create_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::Ingress(o) => create_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::Route(o) => create_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::NetworkPolicy(o) => create_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::PersistentVolumeClaim(o) => {
                create_in(self.namespaced(ns), o).await?.into()
            }
            ManagedObject::ServiceAccount(o) => create_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::Role(o) => create_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::RoleBinding(o) => create_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::ClusterRoleBinding(o) => {
                create_in(Api::all(self.client.clone()), o).await?.into()
            }
            ManagedObject::Issuer(o) => create_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::Certificate(o) => create_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::Deployment(o) => create_in(self.namespaced(ns), o).await?.into(),
        };
        Ok(created)
    }

    async fn replace(&self, object: &ManagedObject) -> Result<ManagedObject, ApiError> {
        let ns = object.meta().namespace.as_deref();
        let replaced = match object {
            ManagedObject::ConfigMap(o) => replace_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::Secret(o) => replace_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::Service(o) => replace_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::Ingress(o) => replace_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::Route(o) => replace_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::NetworkPolicy(o) => replace_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::PersistentVolumeClaim(o) => {
                replace_in(self.namespaced(ns), o).await?.into()
            }
            ManagedObject::ServiceAccount(o) => replace_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::Role(o) => replace_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::RoleBinding(o) => replace_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::ClusterRoleBinding(o) => {
                replace_in(Api::all(self.client.clone()), o).await?.into()
            }
            ManagedObject::Issuer(o) => replace_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::Certificate(o) => replace_in(self.namespaced(ns), o).await?.into(),
            ManagedObject::Deployment(o) => replace_in(self.namespaced(ns), o).await?.into(),
        };
        Ok(replaced)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<DeleteOutcome, ApiError> {
        let ns = key.namespace.as_deref();
        let name = key.name.as_str();
        match key.kind {
            ResourceKind::ConfigMap => delete_in::<ConfigMap>(self.namespaced(ns), name).await,
            ResourceKind::Secret => delete_in::<Secret>(self.namespaced(ns), name).await,
            ResourceKind::Service => delete_in::<Service>(self.namespaced(ns), name).await,
            ResourceKind::Ingress => delete_in::<Ingress>(self.namespaced(ns), name).await,
            ResourceKind::Route => delete_in::<Route>(self.namespaced(ns), name).await,
            ResourceKind::NetworkPolicy => {
                delete_in::<NetworkPolicy>(self.namespaced(ns), name).await
            }
            ResourceKind::PersistentVolumeClaim => {
                delete_in::<PersistentVolumeClaim>(self.namespaced(ns), name).await
            }
            ResourceKind::ServiceAccount => {
                delete_in::<ServiceAccount>(self.namespaced(ns), name).await
            }
            ResourceKind::Role => delete_in::<Role>(self.namespaced(ns), name).await,
            ResourceKind::RoleBinding => delete_in::<RoleBinding>(self.namespaced(ns), name).await,
            ResourceKind::ClusterRoleBinding => {
                delete_in::<ClusterRoleBinding>(Api::all(self.client.clone()), name).await
            }
            ResourceKind::Issuer => delete_in::<Issuer>(self.namespaced(ns), name).await,
            ResourceKind::Certificate => delete_in::<Certificate>(self.namespaced(ns), name).await,
            ResourceKind::Deployment => delete_in::<Deployment>(self.namespaced(ns), name).await,
        }
    }

    async fn cert_manager_installed(&self) -> Result<bool, ApiError> {
        let crds: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        Ok(get_opt(crds, CERT_MANAGER_CRD).await?.is_some())
    }

    async fn patch_status(
        &self,
        instance: &InstanceHandle,
        status: &InstallationStatus,
    ) -> Result<(), ApiError> {
        let patch = serde_json::json!({ "status": status });
        let params = PatchParams::apply(FIELD_MANAGER);
        match instance {
            InstanceHandle::Namespaced(i) => {
                let api: Api<Installation> =
                    Api::namespaced(self.client.clone(), &i.namespace().unwrap_or_default());
                api.patch_status(&i.name_any(), &params, &Patch::Merge(patch))
                    .await?;
            }
            InstanceHandle::Cluster(i) => {
                let api: Api<ClusterInstallation> = Api::all(self.client.clone());
                api.patch_status(&i.name_any(), &params, &Patch::Merge(patch))
                    .await?;
            }
        }
        Ok(())
    }

    async fn patch_finalizers(
        &self,
        instance: &InstanceHandle,
        finalizers: &[String],
    ) -> Result<(), ApiError> {
        // resourceVersion makes the merge patch fail on a stale view
        let params = PatchParams::default();
        match instance {
            InstanceHandle::Namespaced(i) => {
                let patch = serde_json::json!({
                    "metadata": {
                        "finalizers": finalizers,
                        "resourceVersion": i.resource_version(),
                    }
                });
                let api: Api<Installation> =
                    Api::namespaced(self.client.clone(), &i.namespace().unwrap_or_default());
                api.patch(&i.name_any(), &params, &Patch::Merge(patch)).await?;
            }
            InstanceHandle::Cluster(i) => {
                let patch = serde_json::json!({
                    "metadata": {
                        "finalizers": finalizers,
                        "resourceVersion": i.resource_version(),
                    }
                });
                let api: Api<ClusterInstallation> = Api::all(self.client.clone());
                api.patch(&i.name_any(), &params, &Patch::Merge(patch)).await?;
            }
        }
        Ok(())
    }

    async fn publish_event(
        &self,
        regarding: &ObjectReference,
        event: &ControllerEvent,
    ) -> Result<(), ApiError> {
        let type_ = match event.severity {
            EventSeverity::Normal => EventType::Normal,
            EventSeverity::Warning => EventType::Warning,
        };
        self.recorder
            .publish(
                &Event {
                    type_,
                    reason: event.reason.clone(),
                    note: Some(event.note.clone()),
                    action: event.action.clone(),
                    secondary: None,
                },
                regarding,
            )
            .await
            .map_err(ApiError::from)
    }
}

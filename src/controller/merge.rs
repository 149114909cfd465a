//! # Desired/Live Merge
//!
//! Pure functions that combine a live object with the desired object built
//! for this pass, producing the object to write back.
//!
//! The result always starts from the live object so server-populated fields
//! (resourceVersion, status, cluster IPs, volume bindings) survive. Only the
//! fields the controller owns are overwritten. Labels and annotations are
//! merged, so anything added by other tools is kept.
//!
//! Deployment templates and Service ports come back from the API server with
//! defaults filled in. They are only overwritten when a field the controller
//! sets differs (see [`covers`]), otherwise every pass would write.
//!
//! Immutable fields that differ are reported as [`MergeError`] instead of being
//! written, because the API server would reject the update.

use crate::constants::{ANNOTATION_CA_DIGEST, ANNOTATION_GENERATED, ANNOTATION_OAUTH_REDIRECT};
use crate::controller::resources::{ManagedObject, ResourceKind};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PodTemplateSpec, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::RoleRef;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Desired object cannot be written over the live one
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    /// Deployment pod selector differs; selectors are immutable
    #[error("pod selector is immutable and differs from the desired selector")]
    SelectorModified,
    /// Binding roleRef differs; roleRef is immutable
    #[error("roleRef is immutable and differs from the desired roleRef")]
    RoleRefModified,
    #[error("cannot merge {desired} into {live}")]
    KindMismatch {
        live: ResourceKind,
        desired: ResourceKind,
    },
}

impl MergeError {
    /// Whether deleting and recreating the object resolves the conflict
    pub fn requires_recreate(&self) -> bool {
        matches!(
            self,
            MergeError::SelectorModified | MergeError::RoleRefModified
        )
    }
}

/// Merge `desired` into `live`
pub fn merge(live: &ManagedObject, desired: &ManagedObject) -> Result<ManagedObject, MergeError> {
    let mut merged = live.clone();
    merge_meta(merged.meta_mut(), desired.meta());

    match (&mut merged, desired) {
        (ManagedObject::ConfigMap(m), ManagedObject::ConfigMap(d)) => {
            m.data.clone_from(&d.data);
            m.binary_data.clone_from(&d.binary_data);
        }
        (ManagedObject::Secret(m), ManagedObject::Secret(d)) => merge_secret(m, d),
        (ManagedObject::Service(m), ManagedObject::Service(d)) => merge_service(m, d),
        (ManagedObject::Ingress(m), ManagedObject::Ingress(d)) => m.spec.clone_from(&d.spec),
        (ManagedObject::Route(m), ManagedObject::Route(d)) => {
            let live_host = m.spec.host.take();
            m.spec = d.spec.clone();
            if m.spec.host.is_none() {
                m.spec.host = live_host;
            }
        }
        (ManagedObject::NetworkPolicy(m), ManagedObject::NetworkPolicy(d)) => {
            m.spec.clone_from(&d.spec);
        }
        (ManagedObject::PersistentVolumeClaim(m), ManagedObject::PersistentVolumeClaim(d)) => {
            merge_claim(m, d);
        }
        (ManagedObject::ServiceAccount(m), ManagedObject::ServiceAccount(d)) => {
            merge_service_account(m, d);
        }
        (ManagedObject::Role(m), ManagedObject::Role(d)) => m.rules.clone_from(&d.rules),
        (ManagedObject::RoleBinding(m), ManagedObject::RoleBinding(d)) => {
            check_role_ref(&m.role_ref, &d.role_ref)?;
            m.subjects.clone_from(&d.subjects);
        }
        (ManagedObject::ClusterRoleBinding(m), ManagedObject::ClusterRoleBinding(d)) => {
            check_role_ref(&m.role_ref, &d.role_ref)?;
            m.subjects.clone_from(&d.subjects);
        }
        (ManagedObject::Issuer(m), ManagedObject::Issuer(d)) => m.spec = d.spec.clone(),
        (ManagedObject::Certificate(m), ManagedObject::Certificate(d)) => m.spec = d.spec.clone(),
        (ManagedObject::Deployment(m), ManagedObject::Deployment(d)) => merge_deployment(m, d)?,
        (m, d) => {
            return Err(MergeError::KindMismatch {
                live: m.kind(),
                desired: d.kind(),
            })
        }
    }
    Ok(merged)
}

/// Merge labels, annotations and owner references; desired values win
pub fn merge_meta(live: &mut ObjectMeta, desired: &ObjectMeta) {
    merge_map(&mut live.labels, desired.labels.as_ref());
    merge_map(&mut live.annotations, desired.annotations.as_ref());

    if let Some(desired_refs) = &desired.owner_references {
        let refs = live.owner_references.get_or_insert_with(Vec::new);
        for owner in desired_refs {
            match refs.iter_mut().find(|r| r.uid == owner.uid) {
                Some(existing) => *existing = owner.clone(),
                None => refs.push(owner.clone()),
            }
        }
    }
}

fn merge_map(live: &mut Option<BTreeMap<String, String>>, desired: Option<&BTreeMap<String, String>>) {
    let Some(desired) = desired else {
        return;
    };
    if desired.is_empty() {
        return;
    }
    let target = live.get_or_insert_with(BTreeMap::new);
    for (k, v) in desired {
        target.insert(k.clone(), v.clone());
    }
}

fn merge_secret(live: &mut Secret, desired: &Secret) {
    let generated = desired
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(ANNOTATION_GENERATED));

    if generated {
        // Values are generated once; only keys missing from the live secret are added
        let data = live.data.get_or_insert_with(BTreeMap::new);
        for (k, v) in desired.data.iter().flatten() {
            data.entry(k.clone()).or_insert_with(|| v.clone());
        }
    } else {
        live.data.clone_from(&desired.data);
    }
    if live.type_.is_none() {
        live.type_.clone_from(&desired.type_);
    }
}

/// Whether every field set in `desired` holds the same value in `live`
///
/// Fields only present in `live` are server defaults and are ignored. Lists
/// must have the same length and match element by element.
pub fn covers<T: Serialize>(live: &T, desired: &T) -> bool {
    match (serde_json::to_value(live), serde_json::to_value(desired)) {
        (Ok(live), Ok(desired)) => value_covers(&live, &desired),
        _ => false,
    }
}

fn value_covers(live: &Value, desired: &Value) -> bool {
    match (live, desired) {
        (_, Value::Null) => true,
        (Value::Object(live), Value::Object(desired)) => {
            desired.iter().all(|(k, d)| match live.get(k) {
                Some(l) => value_covers(l, d),
                None => is_empty(d),
            })
        }
        (Value::Array(live), Value::Array(desired)) => {
            live.len() == desired.len() && live.iter().zip(desired).all(|(l, d)| value_covers(l, d))
        }
        (live, desired) => live == desired,
    }
}

/// The API server drops empty lists and maps
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn merge_service(live: &mut Service, desired: &Service) {
    let Some(desired_spec) = &desired.spec else {
        return;
    };
    let spec = live.spec.get_or_insert_with(Default::default);
    spec.selector.clone_from(&desired_spec.selector);
    if !covers(&spec.ports, &desired_spec.ports) {
        spec.ports.clone_from(&desired_spec.ports);
    }
    if desired_spec.type_.is_some() {
        spec.type_.clone_from(&desired_spec.type_);
    }
}

fn merge_claim(live: &mut PersistentVolumeClaim, desired: &PersistentVolumeClaim) {
    // Only the requested size is mutable after binding
    let requests = desired
        .spec
        .as_ref()
        .and_then(|s| s.resources.as_ref())
        .and_then(|r| r.requests.clone());
    let spec = live.spec.get_or_insert_with(Default::default);
    spec.resources.get_or_insert_with(Default::default).requests = requests;
}

fn merge_service_account(live: &mut ServiceAccount, desired: &ServiceAccount) {
    let desired_has_redirect = desired
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(ANNOTATION_OAUTH_REDIRECT));
    if !desired_has_redirect {
        if let Some(annotations) = live.metadata.annotations.as_mut() {
            annotations.remove(ANNOTATION_OAUTH_REDIRECT);
        }
    }
}

fn check_role_ref(live: &RoleRef, desired: &RoleRef) -> Result<(), MergeError> {
    if live.name == desired.name && live.kind == desired.kind && live.api_group == desired.api_group
    {
        Ok(())
    } else {
        Err(MergeError::RoleRefModified)
    }
}

fn merge_deployment(live: &mut Deployment, desired: &Deployment) -> Result<(), MergeError> {
    let Some(desired_spec) = &desired.spec else {
        return Ok(());
    };
    let spec = live.spec.get_or_insert_with(Default::default);
    if spec.selector != desired_spec.selector {
        return Err(MergeError::SelectorModified);
    }
    spec.replicas = desired_spec.replicas;
    if !covers(&spec.strategy, &desired_spec.strategy) {
        spec.strategy.clone_from(&desired_spec.strategy);
    }
    // A digest dropped from the desired template must still roll the pods
    if !covers(&spec.template, &desired_spec.template)
        || ca_digest(&spec.template) != ca_digest(&desired_spec.template)
    {
        spec.template = desired_spec.template.clone();
    }
    Ok(())
}

fn ca_digest(template: &PodTemplateSpec) -> Option<&String> {
    template
        .metadata
        .as_ref()
        .and_then(|m| m.annotations.as_ref())
        .and_then(|a| a.get(ANNOTATION_CA_DIGEST))
}

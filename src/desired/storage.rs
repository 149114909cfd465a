//! Claims, generated secrets and the marker config maps.

use super::{meta, Names};
use crate::constants::ANNOTATION_GENERATED;
use crate::crd::StorageComponentSpec;
use crate::instance::Instance;
use k8s_openapi::api::core::v1::{
    ConfigMap, PersistentVolumeClaim, PersistentVolumeClaimSpec, Secret,
    VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::ByteString;
use std::collections::{BTreeMap, BTreeSet};

/// Key of the recorded namespace list in the lock marker
pub const LOCK_NAMESPACES_KEY: &str = "namespaces";
pub const LOCK_OWNER_KEY: &str = "owner";
pub const LOCK_INSTANCE_KEY: &str = "instance";

/// Key of the CA certificate in the trust bundle
pub const TRUST_BUNDLE_KEY: &str = "ca.crt";

pub fn claim(
    instance: &Instance,
    name: &str,
    storage: &StorageComponentSpec,
) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: meta(name, instance.install_namespace(), instance.labels()),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: storage.storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(storage.size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Secret whose values are generated on creation and kept afterwards
fn generated_secret(instance: &Instance, name: &str, keys: &[(&str, String)]) -> Secret {
    let mut metadata = meta(name, instance.install_namespace(), instance.labels());
    metadata.annotations = Some(BTreeMap::from([(
        ANNOTATION_GENERATED.to_string(),
        "true".to_string(),
    )]));
    Secret {
        metadata,
        type_: Some("Opaque".to_string()),
        data: Some(
            keys.iter()
                .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}

fn random_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn database_secret(instance: &Instance) -> Secret {
    generated_secret(
        instance,
        &Names::new(instance).database_secret(),
        &[
            ("username", "installation".to_string()),
            ("password", random_token()),
            ("database", "installation".to_string()),
        ],
    )
}

pub fn object_storage_secret(instance: &Instance) -> Secret {
    generated_secret(
        instance,
        &Names::new(instance).object_storage_secret(),
        &[("access-key", random_token()), ("secret-key", random_token())],
    )
}

pub fn keystore_secret(instance: &Instance) -> Secret {
    generated_secret(
        instance,
        &Names::new(instance).keystore_secret(),
        &[("password", random_token())],
    )
}

/// Lock marker recording owner identity and every namespace that may hold
/// cross-namespace objects of this installation
pub fn lock_marker(instance: &Instance, namespaces: &BTreeSet<String>) -> ConfigMap {
    ConfigMap {
        metadata: meta(
            &Names::new(instance).lock(),
            instance.install_namespace(),
            instance.labels(),
        ),
        data: Some(BTreeMap::from([
            (LOCK_OWNER_KEY.to_string(), instance.display_name()),
            (LOCK_INSTANCE_KEY.to_string(), instance.id()),
            (
                LOCK_NAMESPACES_KEY.to_string(),
                namespaces.iter().cloned().collect::<Vec<_>>().join(","),
            ),
        ])),
        ..Default::default()
    }
}

/// Namespaces recorded in a lock marker
pub fn recorded_namespaces(lock: &ConfigMap) -> BTreeSet<String> {
    lock.data
        .as_ref()
        .and_then(|d| d.get(LOCK_NAMESPACES_KEY))
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|ns| !ns.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// CA certificate published for components and agents
pub fn trust_bundle(instance: &Instance, ca_cert: &[u8]) -> ConfigMap {
    ConfigMap {
        metadata: meta(
            &Names::new(instance).trust_bundle(),
            instance.install_namespace(),
            instance.labels(),
        ),
        data: Some(BTreeMap::from([(
            TRUST_BUNDLE_KEY.to_string(),
            String::from_utf8_lossy(ca_cert).into_owned(),
        )])),
        ..Default::default()
    }
}

//! Component Deployments and Services.

use super::{component_labels, meta, selector_labels, Names};
use crate::config::ImageSet;
use crate::constants::{
    ANNOTATION_CA_DIGEST, DATABASE_PORT, GRAFANA_PORT, OBJECT_STORAGE_PORT, REPORTS_PORT,
    SERVER_HTTP_PORT, SERVER_PORT,
};
use crate::controller::conditions::Component;
use crate::controller::tls::TlsConfig;
use crate::instance::Instance;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EnvVar, PersistentVolumeClaimVolumeSource, PodSpec,
    PodTemplateSpec, Probe, SecretVolumeSource, Service, ServicePort, ServiceSpec,
    TCPSocketAction, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

const MOUNT_ROOT: &str = "/etc/installation";

/// Port name and number a component listens on
pub fn component_port(component: Component, tls: bool) -> (&'static str, i32) {
    match component {
        Component::Server if tls => ("https", SERVER_PORT),
        Component::Server => ("http", SERVER_HTTP_PORT),
        Component::Database => ("postgres", DATABASE_PORT),
        Component::ObjectStorage => ("s3", OBJECT_STORAGE_PORT),
        Component::ReportGenerator => ("reports", REPORTS_PORT),
        Component::Grafana => ("grafana", GRAFANA_PORT),
    }
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

/// Volume and mount for a secret under [`MOUNT_ROOT`]
fn secret_mount(volume: &str, secret: &str) -> (Volume, VolumeMount) {
    (
        Volume {
            name: volume.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        },
        VolumeMount {
            name: volume.to_string(),
            mount_path: format!("{MOUNT_ROOT}/{volume}"),
            read_only: Some(true),
            ..Default::default()
        },
    )
}

/// Volume and mount for a config map under [`MOUNT_ROOT`]
fn config_map_mount(volume: &str, config_map: &str) -> (Volume, VolumeMount) {
    (
        Volume {
            name: volume.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: config_map.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        },
        VolumeMount {
            name: volume.to_string(),
            mount_path: format!("{MOUNT_ROOT}/{volume}"),
            read_only: Some(true),
            ..Default::default()
        },
    )
}

fn claim_mount(claim: &str, path: &str) -> (Volume, VolumeMount) {
    (
        Volume {
            name: "data".to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: claim.to_string(),
                read_only: Some(false),
            }),
            ..Default::default()
        },
        VolumeMount {
            name: "data".to_string(),
            mount_path: path.to_string(),
            ..Default::default()
        },
    )
}

/// Container-level pieces that differ per component
struct PodParts {
    image: String,
    replicas: i32,
    recreate: bool,
    args: Option<Vec<String>>,
    env: Vec<EnvVar>,
    mounts: Vec<(Volume, VolumeMount)>,
}

fn parts(
    instance: &Instance,
    component: Component,
    images: &ImageSet,
    tls: Option<&TlsConfig>,
) -> PodParts {
    let names = Names::new(instance);
    let spec = instance.spec();
    let ns = instance.install_namespace();

    match component {
        Component::Server => {
            let mut vars = vec![
                env("DATABASE_HOST", names.workload(Component::Database)),
                env("DATABASE_PORT", DATABASE_PORT.to_string()),
                env(
                    "OBJECT_STORAGE_ENDPOINT",
                    format!(
                        "http://{}.{ns}.svc:{OBJECT_STORAGE_PORT}",
                        names.workload(Component::ObjectStorage)
                    ),
                ),
                env(
                    "TARGET_NAMESPACES",
                    instance.target_namespaces().unwrap_or_default().join(","),
                ),
                env("TLS_ENABLED", tls.is_some().to_string()),
            ];
            if spec.report_generator.replicas > 0 {
                let (_, port) = component_port(Component::ReportGenerator, tls.is_some());
                vars.push(env(
                    "REPORTS_URL",
                    format!(
                        "{}://{}.{ns}.svc:{port}",
                        if tls.is_some() { "https" } else { "http" },
                        names.workload(Component::ReportGenerator)
                    ),
                ));
            }
            let mut mounts = vec![
                secret_mount("database", &names.database_secret()),
                secret_mount("object-storage", &names.object_storage_secret()),
            ];
            if let Some(tls) = tls {
                mounts.push(secret_mount("tls", &tls.server_secret));
                mounts.push(secret_mount("keystore", &tls.keystore_secret));
                mounts.push(config_map_mount("ca", &tls.trust_bundle));
            }
            PodParts {
                image: images.server.clone(),
                replicas: spec.server.replicas,
                recreate: false,
                args: None,
                env: vars,
                mounts,
            }
        }
        Component::Database => PodParts {
            image: images.database.clone(),
            replicas: 1,
            recreate: true,
            args: None,
            env: vec![env("PGDATA", "/var/lib/postgresql/data/pgdata")],
            mounts: vec![
                claim_mount(&names.database_claim(), "/var/lib/postgresql/data"),
                secret_mount("database", &names.database_secret()),
            ],
        },
        Component::ObjectStorage => PodParts {
            image: images.object_storage.clone(),
            replicas: 1,
            recreate: true,
            args: Some(vec!["server".to_string(), "/data".to_string()]),
            env: Vec::new(),
            mounts: vec![
                claim_mount(&names.object_storage_claim(), "/data"),
                secret_mount("object-storage", &names.object_storage_secret()),
            ],
        },
        Component::ReportGenerator => {
            let mut mounts = Vec::new();
            if let Some(tls) = tls {
                mounts.push(secret_mount("tls", &tls.reports_secret));
                mounts.push(config_map_mount("ca", &tls.trust_bundle));
            }
            PodParts {
                image: images.report_generator.clone(),
                replicas: spec.report_generator.replicas,
                recreate: false,
                args: None,
                env: vec![
                    env("SERVER_HOST", names.workload(Component::Server)),
                    env("TLS_ENABLED", tls.is_some().to_string()),
                ],
                mounts,
            }
        }
        Component::Grafana => {
            let mut mounts = Vec::new();
            if let Some(secret) = tls.and_then(|t| t.grafana_secret.as_deref()) {
                mounts.push(secret_mount("tls", secret));
            }
            PodParts {
                image: images.grafana.clone(),
                replicas: 1,
                recreate: false,
                args: None,
                env: vec![env(
                    "GF_SERVER_PROTOCOL",
                    if tls.is_some() { "https" } else { "http" },
                )],
                mounts,
            }
        }
    }
}

/// Deployment of one component
pub fn deployment(
    instance: &Instance,
    component: Component,
    images: &ImageSet,
    tls: Option<&TlsConfig>,
) -> Deployment {
    let names = Names::new(instance);
    let labels = component_labels(instance, component);
    let (port_name, port) = component_port(component, tls.is_some());
    let parts = parts(instance, component, images, tls);

    let annotations = tls.map(|t| {
        BTreeMap::from([(ANNOTATION_CA_DIGEST.to_string(), t.ca_digest())])
    });
    let (volumes, volume_mounts): (Vec<_>, Vec<_>) = parts.mounts.into_iter().unzip();

    let container = Container {
        name: component.suffix().to_string(),
        image: Some(parts.image),
        args: parts.args,
        env: Some(parts.env),
        ports: Some(vec![ContainerPort {
            name: Some(port_name.to_string()),
            container_port: port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        readiness_probe: Some(Probe {
            tcp_socket: Some(TCPSocketAction {
                port: IntOrString::Int(port),
                ..Default::default()
            }),
            period_seconds: Some(10),
            ..Default::default()
        }),
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    };

    Deployment {
        metadata: meta(&names.workload(component), instance.install_namespace(), labels.clone()),
        spec: Some(DeploymentSpec {
            replicas: Some(parts.replicas),
            selector: LabelSelector {
                match_labels: Some(selector_labels(instance, component)),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some(if parts.recreate { "Recreate" } else { "RollingUpdate" }.to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations,
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(names.service_account()),
                    containers: vec![container],
                    volumes: Some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// ClusterIP Service in front of one component
pub fn service(instance: &Instance, component: Component, tls: bool) -> Service {
    let names = Names::new(instance);
    let (port_name, port) = component_port(component, tls);
    Service {
        metadata: meta(
            &names.workload(component),
            instance.install_namespace(),
            component_labels(instance, component),
        ),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector_labels(instance, component)),
            ports: Some(vec![ServicePort {
                name: Some(port_name.to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

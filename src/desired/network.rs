//! Exposure objects and the optional network policy.

use super::workloads::component_port;
use super::{component_labels, meta, selector_labels, Names};
use crate::config::Platform;
use crate::controller::conditions::Component;
use crate::crd::route::{Route, RoutePort, RouteSpec, RouteTargetReference, RouteTls};
use crate::instance::Instance;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, NetworkPolicy, NetworkPolicyIngressRule,
    NetworkPolicyPeer, NetworkPolicyPort, NetworkPolicySpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

const NGINX_BACKEND_PROTOCOL: &str = "nginx.ingress.kubernetes.io/backend-protocol";
const NAMESPACE_NAME_LABEL: &str = "kubernetes.io/metadata.name";
const OPENSHIFT_INGRESS_POLICY_GROUP: &str = "policy-group.network.openshift.io/ingress";
const INGRESS_CONTROLLER_NAMESPACE: &str = "ingress-nginx";

pub fn ingress(instance: &Instance, host: &str, tls_secret: Option<&str>) -> Ingress {
    let names = Names::new(instance);
    let service = names.workload(Component::Server);
    let (_, port) = component_port(Component::Server, tls_secret.is_some());

    let mut metadata = meta(
        &service,
        instance.install_namespace(),
        component_labels(instance, Component::Server),
    );
    if tls_secret.is_some() {
        metadata.annotations = Some(BTreeMap::from([(
            NGINX_BACKEND_PROTOCOL.to_string(),
            "HTTPS".to_string(),
        )]));
    }

    Ingress {
        metadata,
        spec: Some(IngressSpec {
            ingress_class_name: instance.spec().exposure.ingress_class_name.clone(),
            rules: Some(vec![IngressRule {
                host: Some(host.to_string()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: service.clone(),
                                port: Some(ServiceBackendPort {
                                    number: Some(port),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            tls: tls_secret.map(|secret| {
                vec![IngressTLS {
                    hosts: Some(vec![host.to_string()]),
                    secret_name: Some(secret.to_string()),
                }]
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn route(instance: &Instance, tls: bool) -> Route {
    let names = Names::new(instance);
    let service = names.workload(Component::Server);
    let (port_name, _) = component_port(Component::Server, tls);

    let mut route = Route::new(
        &service,
        RouteSpec {
            host: instance.spec().exposure.host.clone(),
            to: RouteTargetReference {
                kind: "Service".to_string(),
                name: service.clone(),
            },
            port: Some(RoutePort {
                target_port: IntOrString::String(port_name.to_string()),
            }),
            tls: Some(RouteTls {
                termination: if tls { "reencrypt" } else { "edge" }.to_string(),
                insecure_edge_termination_policy: Some("Redirect".to_string()),
            }),
        },
    );
    route.metadata = meta(
        &service,
        instance.install_namespace(),
        component_labels(instance, Component::Server),
    );
    route
}

/// Admits traffic to the main service from its own namespace, the target
/// namespaces and the platform's ingress layer
pub fn network_policy(
    instance: &Instance,
    platform: Platform,
    targets: &[String],
    tls: bool,
) -> NetworkPolicy {
    let (_, port) = component_port(Component::Server, tls);

    let ingress_layer = match platform {
        Platform::OpenShift => LabelSelector {
            match_labels: Some(BTreeMap::from([(
                OPENSHIFT_INGRESS_POLICY_GROUP.to_string(),
                String::new(),
            )])),
            ..Default::default()
        },
        Platform::Kubernetes => LabelSelector {
            match_labels: Some(BTreeMap::from([(
                NAMESPACE_NAME_LABEL.to_string(),
                INGRESS_CONTROLLER_NAMESPACE.to_string(),
            )])),
            ..Default::default()
        },
    };

    let mut peers = vec![
        NetworkPolicyPeer {
            pod_selector: Some(LabelSelector::default()),
            ..Default::default()
        },
        NetworkPolicyPeer {
            namespace_selector: Some(ingress_layer),
            ..Default::default()
        },
    ];
    if !targets.is_empty() {
        peers.push(NetworkPolicyPeer {
            namespace_selector: Some(LabelSelector {
                match_expressions: Some(vec![LabelSelectorRequirement {
                    key: NAMESPACE_NAME_LABEL.to_string(),
                    operator: "In".to_string(),
                    values: Some(targets.to_vec()),
                }]),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    NetworkPolicy {
        metadata: meta(
            &Names::new(instance).network_policy(),
            instance.install_namespace(),
            component_labels(instance, Component::Server),
        ),
        spec: Some(NetworkPolicySpec {
            pod_selector: Some(LabelSelector {
                match_labels: Some(selector_labels(instance, Component::Server)),
                ..Default::default()
            }),
            policy_types: Some(vec!["Ingress".to_string()]),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(peers),
                ports: Some(vec![NetworkPolicyPort {
                    port: Some(IntOrString::Int(port)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                }]),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

//! cert-manager issuer chain and certificates.
//!
//! Chain: self-signed issuer -> CA certificate -> CA issuer -> leaf certificates.
//! Every certificate lives in the install namespace, agent certificates for
//! target namespaces included. Target namespaces only receive the public CA
//! certificate and the agent key pair.

use super::{meta, service_dns_names, Names};
use crate::controller::conditions::Component;
use crate::crd::cert_manager::{
    CaIssuer, Certificate, CertificatePrivateKey, CertificateSpec, Issuer, IssuerSpec,
    ObjectReference, SelfSignedIssuer,
};
use crate::instance::Instance;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;

const CA_DURATION: &str = "87600h";
const LEAF_DURATION: &str = "8760h";

/// Key of the CA certificate in cert-manager secrets
pub const CA_CERT_KEY: &str = "ca.crt";
const LEAF_KEYS: [&str; 2] = ["tls.crt", "tls.key"];
const TLS_SECRET_TYPE: &str = "kubernetes.io/tls";

fn issuer(name: &str, namespace: &str, instance: &Instance, spec: IssuerSpec) -> Issuer {
    let mut issuer = Issuer::new(name, spec);
    issuer.metadata = meta(name, namespace, instance.labels());
    issuer
}

fn certificate(name: &str, namespace: &str, instance: &Instance, spec: CertificateSpec) -> Certificate {
    let mut certificate = Certificate::new(name, spec);
    certificate.metadata = meta(name, namespace, instance.labels());
    certificate
}

fn issuer_ref(name: String) -> ObjectReference {
    ObjectReference {
        name,
        kind: Some("Issuer".to_string()),
    }
}

fn ecdsa_key() -> Option<CertificatePrivateKey> {
    Some(CertificatePrivateKey {
        algorithm: "ECDSA".to_string(),
        size: 256,
    })
}

pub fn selfsigned_issuer(instance: &Instance) -> Issuer {
    issuer(
        &Names::new(instance).selfsigned_issuer(),
        instance.install_namespace(),
        instance,
        IssuerSpec {
            self_signed: Some(SelfSignedIssuer {}),
            ca: None,
        },
    )
}

pub fn ca_certificate(instance: &Instance) -> Certificate {
    let names = Names::new(instance);
    certificate(
        &names.ca_certificate(),
        instance.install_namespace(),
        instance,
        CertificateSpec {
            secret_name: names.ca_secret(),
            common_name: Some(format!("{}-ca", instance.name())),
            dns_names: Vec::new(),
            duration: Some(CA_DURATION.to_string()),
            is_ca: Some(true),
            issuer_ref: issuer_ref(names.selfsigned_issuer()),
            private_key: ecdsa_key(),
        },
    )
}

pub fn ca_issuer(instance: &Instance) -> Issuer {
    let names = Names::new(instance);
    issuer(
        &names.ca_issuer(),
        instance.install_namespace(),
        instance,
        IssuerSpec {
            self_signed: None,
            ca: Some(CaIssuer {
                secret_name: names.ca_secret(),
            }),
        },
    )
}

/// Leaf certificate for a component service, plus the exposure host for the server
pub fn leaf_certificate(instance: &Instance, component: Component) -> Certificate {
    let names = Names::new(instance);
    let service = names.workload(component);
    let mut dns_names = service_dns_names(&service, instance.install_namespace());
    if component == Component::Server {
        if let Some(host) = &instance.spec().exposure.host {
            dns_names.push(host.clone());
        }
    }
    let name = names.leaf_certificate(component);
    certificate(
        &name,
        instance.install_namespace(),
        instance,
        CertificateSpec {
            secret_name: name.clone(),
            common_name: Some(service),
            dns_names,
            duration: Some(LEAF_DURATION.to_string()),
            is_ca: None,
            issuer_ref: issuer_ref(names.ca_issuer()),
            private_key: ecdsa_key(),
        },
    )
}

/// Public CA certificate for a target namespace
///
/// Only `ca.crt` is published; the CA key never leaves the install namespace.
pub fn ca_copy(instance: &Instance, ca_cert: &[u8], namespace: &str) -> Secret {
    Secret {
        metadata: meta(&Names::new(instance).ca_copy(), namespace, instance.labels()),
        type_: Some("Opaque".to_string()),
        data: Some(BTreeMap::from([(
            CA_CERT_KEY.to_string(),
            ByteString(ca_cert.to_vec()),
        )])),
        ..Default::default()
    }
}

/// Client certificate for the observing agent of `namespace`
///
/// Issued by the CA issuer in the install namespace; the resulting secret is
/// copied to `namespace` by [`agent_secret_copy`].
pub fn agent_certificate(instance: &Instance, namespace: &str) -> Certificate {
    let names = Names::new(instance);
    let name = names.agent_certificate(namespace);
    certificate(
        &name,
        instance.install_namespace(),
        instance,
        CertificateSpec {
            secret_name: name.clone(),
            common_name: Some(format!("{}-agent.{namespace}", instance.name())),
            dns_names: vec![format!("{}-agent.{namespace}.svc", instance.name())],
            duration: Some(LEAF_DURATION.to_string()),
            is_ca: None,
            issuer_ref: issuer_ref(names.ca_issuer()),
            private_key: ecdsa_key(),
        },
    )
}

/// Agent key pair and CA certificate for a target namespace
pub fn agent_secret_copy(
    instance: &Instance,
    issued: &Secret,
    ca_cert: &[u8],
    namespace: &str,
) -> Secret {
    let mut data: BTreeMap<String, ByteString> = issued
        .data
        .iter()
        .flatten()
        .filter(|(k, _)| LEAF_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    data.insert(CA_CERT_KEY.to_string(), ByteString(ca_cert.to_vec()));
    Secret {
        metadata: meta(&Names::new(instance).agent_secret(), namespace, instance.labels()),
        type_: Some(TLS_SECRET_TYPE.to_string()),
        data: Some(data),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ExposureSpec, InstallationSpec};
    use crate::desired::test_support::instance;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

    #[test]
    fn test_chain_references() {
        let instance = instance(InstallationSpec::default());
        let ca = ca_certificate(&instance);
        assert_eq!(ca.spec.issuer_ref.name, "obs-selfsigned");
        assert_eq!(ca.spec.is_ca, Some(true));
        let issuer = ca_issuer(&instance);
        assert_eq!(issuer.spec.ca.unwrap().secret_name, ca.spec.secret_name);
        let leaf = leaf_certificate(&instance, Component::ReportGenerator);
        assert_eq!(leaf.spec.issuer_ref.name, "obs-ca-issuer");
        assert_eq!(leaf.spec.secret_name, "obs-reports-tls");
    }

    #[test]
    fn test_server_certificate_includes_exposure_host() {
        let instance = instance(InstallationSpec {
            exposure: ExposureSpec {
                host: Some("obs.example.com".to_string()),
                ..Default::default()
            },
            ..Default::default()
        });
        let leaf = leaf_certificate(&instance, Component::Server);
        assert!(leaf.spec.dns_names.contains(&"obs.example.com".to_string()));
        assert!(leaf
            .spec
            .dns_names
            .contains(&"obs-server.obs-system.svc".to_string()));
    }

    #[test]
    fn test_ca_copy_carries_only_the_certificate() {
        let instance = instance(InstallationSpec::default());
        let copy = ca_copy(&instance, b"ca-pem", "payments");
        assert_eq!(copy.metadata.namespace.as_deref(), Some("payments"));
        assert!(copy.metadata.owner_references.is_none());
        let data = copy.data.unwrap();
        assert_eq!(data.keys().collect::<Vec<_>>(), vec![CA_CERT_KEY]);
        assert_eq!(data[CA_CERT_KEY], ByteString(b"ca-pem".to_vec()));
    }

    #[test]
    fn test_agent_certificate_is_issued_in_install_namespace() {
        let instance = instance(InstallationSpec::default());
        let cert = agent_certificate(&instance, "payments");
        let names = Names::new(&instance);
        assert_eq!(cert.metadata.namespace.as_deref(), Some("obs-system"));
        assert_eq!(cert.spec.issuer_ref.name, names.ca_issuer());
        assert_eq!(cert.spec.secret_name, names.agent_certificate("payments"));
        assert_ne!(
            names.agent_certificate("payments"),
            names.agent_certificate("billing")
        );
    }

    #[test]
    fn test_agent_secret_copy_drops_source_metadata() {
        let instance = instance(InstallationSpec::default());
        let mut issued = Secret {
            data: Some(BTreeMap::from([
                ("tls.crt".to_string(), ByteString(b"agent-cert".to_vec())),
                ("tls.key".to_string(), ByteString(b"agent-key".to_vec())),
                ("ca.crt".to_string(), ByteString(b"stale-ca".to_vec())),
            ])),
            ..Default::default()
        };
        issued.metadata.owner_references = Some(vec![OwnerReference::default()]);
        issued.metadata.resource_version = Some("7".to_string());

        let copy = agent_secret_copy(&instance, &issued, b"ca-pem", "payments");
        assert_eq!(copy.metadata.namespace.as_deref(), Some("payments"));
        assert!(copy.metadata.owner_references.is_none());
        assert!(copy.metadata.resource_version.is_none());
        let data = copy.data.unwrap();
        assert_eq!(data["tls.key"], ByteString(b"agent-key".to_vec()));
        assert_eq!(data[CA_CERT_KEY], ByteString(b"ca-pem".to_vec()));
    }
}

//! Prints the install manifests as one YAML stream: the `Installation` and
//! `ClusterInstallation` CRDs, the controller's cluster role and the two
//! reader roles the per-installation bindings reference.
//!
//! Usage:
//!   cargo run --bin crdgen > config/install.yaml

use anyhow::{Context, Result};
use installation_controller::crd::{ClusterInstallation, Installation};
use installation_controller::desired::rbac::shipped_cluster_roles;
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let mut documents = vec![
        serde_yaml::to_string(&Installation::crd()).context("Failed to serialize Installation CRD")?,
        serde_yaml::to_string(&ClusterInstallation::crd())
            .context("Failed to serialize ClusterInstallation CRD")?,
    ];
    for role in shipped_cluster_roles() {
        let name = role.metadata.name.clone().unwrap_or_default();
        documents.push(
            serde_yaml::to_string(&role)
                .with_context(|| format!("Failed to serialize ClusterRole {name}"))?,
        );
    }
    for document in documents {
        print!("---\n{document}");
    }
    Ok(())
}

//! # Conditions
//!
//! Condition vocabulary, the merge-by-type helpers and the projector that
//! mirrors child Deployment health onto the installation.
//!
//! A condition type is either present with a current status or absent.
//! Absent means the aspect does not apply (for example the report generator
//! scaled to zero), so the projector removes conditions whose child no
//! longer exposes them instead of leaving them stale.

use crate::controller::cluster::ClusterApi;
use crate::controller::error::ReconcileError;
use crate::controller::resources::{ObjectKey, ResourceKind, TypedObject};
use crate::crd::Condition;
use crate::desired::Names;
use crate::instance::Instance;
use k8s_openapi::api::apps::v1::Deployment;

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";

pub const TYPE_TLS_SETUP_COMPLETE: &str = "TLSSetupComplete";
pub const TYPE_EXPOSURE_READY: &str = "ExposureReady";

pub const REASON_WAITING_FOR_CERTIFICATE: &str = "WaitingForCertificate";
pub const REASON_ALL_CERTIFICATES_READY: &str = "AllCertificatesReady";
pub const REASON_CERT_MANAGER_UNAVAILABLE: &str = "CertManagerUnavailable";
pub const REASON_CERT_MANAGER_DISABLED: &str = "CertManagerDisabled";
pub const REASON_WAITING_FOR_HOST: &str = "WaitingForHost";
pub const REASON_HOST_ASSIGNED: &str = "HostAssigned";

/// Deployment condition types mirrored per component
const DEPLOYMENT_CONDITIONS: [&str; 3] = ["Available", "Progressing", "ReplicaFailure"];

/// Workload components whose health is projected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Server,
    Database,
    ObjectStorage,
    ReportGenerator,
    Grafana,
}

impl Component {
    pub const ALL: [Component; 5] = [
        Component::Server,
        Component::Database,
        Component::ObjectStorage,
        Component::ReportGenerator,
        Component::Grafana,
    ];

    /// Prefix of the logical condition types, e.g. `ServerAvailable`
    pub fn condition_prefix(self) -> &'static str {
        match self {
            Component::Server => "Server",
            Component::Database => "Database",
            Component::ObjectStorage => "ObjectStorage",
            Component::ReportGenerator => "ReportGenerator",
            Component::Grafana => "Grafana",
        }
    }

    /// Name suffix of the component's Deployment and Service
    pub fn suffix(self) -> &'static str {
        match self {
            Component::Server => "server",
            Component::Database => "database",
            Component::ObjectStorage => "object-storage",
            Component::ReportGenerator => "reports",
            Component::Grafana => "grafana",
        }
    }

    /// Logical condition type mapped to each Deployment condition type
    pub fn condition_mapping(self) -> Vec<(String, &'static str)> {
        DEPLOYMENT_CONDITIONS
            .iter()
            .map(|child| (format!("{}{child}", self.condition_prefix()), *child))
            .collect()
    }
}

/// Set a condition, replacing any condition of the same type
///
/// The transition time only moves when the status changes.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
    now: &str,
) {
    let transition = conditions
        .iter()
        .find(|c| c.r#type == type_)
        .filter(|c| c.status == status)
        .and_then(|c| c.last_transition_time.clone())
        .unwrap_or_else(|| now.to_string());

    let condition = Condition {
        r#type: type_.to_string(),
        status: status.to_string(),
        last_transition_time: Some(transition),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
    };

    match conditions.iter_mut().find(|c| c.r#type == type_) {
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }
}

pub fn remove_condition(conditions: &mut Vec<Condition>, type_: &str) {
    conditions.retain(|c| c.r#type != type_);
}

/// Mirror child conditions onto the parent
///
/// `mapping` pairs a logical type with the child condition type it mirrors.
/// Logical types whose child condition is missing are removed.
pub fn project(
    conditions: &mut Vec<Condition>,
    mapping: &[(String, &str)],
    child: Option<&Deployment>,
    now: &str,
) {
    let child_conditions = child
        .and_then(|d| d.status.as_ref())
        .and_then(|s| s.conditions.as_ref());

    for (logical, child_type) in mapping {
        let mirrored = child_conditions.and_then(|cs| cs.iter().find(|c| c.type_ == *child_type));
        match mirrored {
            Some(c) => set_condition(
                conditions,
                logical,
                &c.status,
                c.reason.as_deref().unwrap_or(""),
                c.message.as_deref().unwrap_or(""),
                now,
            ),
            None => remove_condition(conditions, logical),
        }
    }
}

/// Project the health of every component Deployment of an installation
pub async fn project_components(
    api: &dyn ClusterApi,
    instance: &Instance,
    conditions: &mut Vec<Condition>,
    now: &str,
) -> Result<(), ReconcileError> {
    let names = Names::new(instance);
    for component in Component::ALL {
        let key = ObjectKey::namespaced(
            ResourceKind::Deployment,
            instance.install_namespace(),
            &names.workload(component),
        );
        let deployment = api
            .get(&key)
            .await
            .map_err(|e| ReconcileError::api("get", &key, e))?
            .and_then(Deployment::from_managed);
        project(
            conditions,
            &component.condition_mapping(),
            deployment.as_ref(),
            now,
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentCondition, DeploymentStatus};

    fn deployment_with(conditions: &[(&str, &str)]) -> Deployment {
        Deployment {
            status: Some(DeploymentStatus {
                conditions: Some(
                    conditions
                        .iter()
                        .map(|(t, s)| DeploymentCondition {
                            type_: (*t).to_string(),
                            status: (*s).to_string(),
                            reason: Some("MinimumReplicasAvailable".to_string()),
                            message: Some("ok".to_string()),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_set_condition_replaces_by_type() {
        let mut conditions = Vec::new();
        set_condition(&mut conditions, "A", STATUS_FALSE, "R1", "m1", "t1");
        set_condition(&mut conditions, "A", STATUS_TRUE, "R2", "m2", "t2");
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, "True");
        assert_eq!(conditions[0].last_transition_time.as_deref(), Some("t2"));
    }

    #[test]
    fn test_transition_time_kept_when_status_unchanged() {
        let mut conditions = Vec::new();
        set_condition(&mut conditions, "A", STATUS_TRUE, "R1", "m1", "t1");
        set_condition(&mut conditions, "A", STATUS_TRUE, "R2", "m2", "t2");
        assert_eq!(conditions[0].last_transition_time.as_deref(), Some("t1"));
        assert_eq!(conditions[0].reason.as_deref(), Some("R2"));
    }

    #[test]
    fn test_project_mirrors_child_conditions() {
        let mut conditions = Vec::new();
        let deployment = deployment_with(&[("Available", "True"), ("Progressing", "True")]);
        project(
            &mut conditions,
            &Component::Server.condition_mapping(),
            Some(&deployment),
            "now",
        );
        let types: Vec<_> = conditions.iter().map(|c| c.r#type.as_str()).collect();
        assert_eq!(types, vec!["ServerAvailable", "ServerProgressing"]);
    }

    #[test]
    fn test_project_removes_conditions_of_missing_child() {
        let mut conditions = Vec::new();
        let deployment = deployment_with(&[("Available", "True"), ("ReplicaFailure", "True")]);
        let mapping = Component::ReportGenerator.condition_mapping();
        project(&mut conditions, &mapping, Some(&deployment), "now");
        assert_eq!(conditions.len(), 2);

        project(&mut conditions, &mapping, None, "later");
        assert!(conditions.is_empty());
    }

    #[test]
    fn test_project_leaves_unrelated_conditions() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            TYPE_TLS_SETUP_COMPLETE,
            STATUS_TRUE,
            REASON_ALL_CERTIFICATES_READY,
            "",
            "now",
        );
        project(&mut conditions, &Component::Grafana.condition_mapping(), None, "now");
        assert_eq!(conditions.len(), 1);
    }
}

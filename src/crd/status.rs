//! # Installation Status
//!
//! Status types shared by `Installation` and `ClusterInstallation`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of an installation
///
/// `target_namespaces` is the last set that was applied completely. It is
/// written once per successful pass, after every namespace-scoped side effect
/// for the new set has finished.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstallationStatus {
    /// URL of the main service
    #[serde(default)]
    pub url: Option<String>,
    /// Target namespaces applied by the last successful pass
    #[serde(default)]
    pub target_namespaces: Vec<String>,
    /// Database claim name
    #[serde(default)]
    pub database_claim: Option<String>,
    /// Object storage claim name
    #[serde(default)]
    pub object_storage_claim: Option<String>,
    /// Names of the secrets managed in the install namespace
    #[serde(default)]
    pub secrets: Vec<String>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Observed generation
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}

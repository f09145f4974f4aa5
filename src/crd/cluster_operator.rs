//! # ClusterOperator
//!
//! The externally visible status object. The spec is empty; everything of
//! interest lives in the status.

use crate::crd::Condition;
use serde::{Deserialize, Serialize};

/// ClusterOperator Custom Resource Definition
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ClusterOperator",
    group = "config.openshift.io",
    version = "v1",
    status = "crate::crd::ClusterOperatorStatus",
    plural = "clusteroperators",
    shortname = "co"
)]
pub struct ClusterOperatorSpec {}

/// Aggregated status of an operator
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOperatorStatus {
    /// Available, Progressing, Degraded and Upgradeable
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Reported component versions
    #[serde(default)]
    pub versions: Vec<OperandVersion>,
    /// Objects worth inspecting when debugging this operator
    #[serde(default)]
    pub related_objects: Vec<ObjectReference>,
}

impl ClusterOperatorStatus {
    /// Look up a condition by type
    #[must_use]
    pub fn condition(&self, r#type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == r#type)
    }

    /// Look up a reported version by component name
    #[must_use]
    pub fn version(&self, name: &str) -> Option<&str> {
        self.versions
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.version.as_str())
    }
}

/// Component name and the version it runs
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, schemars::JsonSchema)]
pub struct OperandVersion {
    pub name: String,
    pub version: String,
}

/// Reference to a related object
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    /// API group, empty for the core group
    #[serde(default)]
    pub group: String,
    /// Plural resource name
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectReference {
    /// Reference to a namespace
    #[must_use]
    pub fn namespace(name: &str) -> Self {
        Self {
            group: String::new(),
            resource: "namespaces".to_string(),
            namespace: None,
            name: name.to_string(),
        }
    }
}

//! # CSISnapshotController
//!
//! The operator resource. Its spec is the desired state the administrator
//! edits; its status holds the conditions every control loop reports.

use crate::crd::{Condition, LogLevel};
use serde::{Deserialize, Serialize};

/// CSISnapshotController Custom Resource Definition
///
/// There is exactly one instance, named `cluster`.
///
/// # Example
///
/// ```yaml
/// apiVersion: operator.openshift.io/v1
/// kind: CSISnapshotController
/// metadata:
///   name: cluster
/// spec:
///   managementState: Managed
///   logLevel: Debug
///   operatorLogLevel: Normal
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, PartialEq, schemars::JsonSchema,
)]
#[kube(
    kind = "CSISnapshotController",
    group = "operator.openshift.io",
    version = "v1",
    status = "crate::crd::OperatorStatus",
    plural = "csisnapshotcontrollers",
    printcolumn = r#"{"name":"Management", "type":"string", "jsonPath":".spec.managementState"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OperatorSpec {
    /// Whether and how the operator should manage its operands
    #[serde(default)]
    pub management_state: ManagementState,
    /// Log level of the operands
    #[serde(default)]
    pub log_level: LogLevel,
    /// Log level of the operator itself
    #[serde(default)]
    pub operator_log_level: LogLevel,
}

/// Management mode of the operator
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash, schemars::JsonSchema,
)]
pub enum ManagementState {
    /// Operator actively reconciles its operands
    #[default]
    Managed,
    /// Operator leaves operands alone but keeps reporting
    Unmanaged,
    /// Operands should be removed
    Removed,
    /// Managed, overriding safety checks
    Force,
}

impl ManagementState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagementState::Managed => "Managed",
            ManagementState::Unmanaged => "Unmanaged",
            ManagementState::Removed => "Removed",
            ManagementState::Force => "Force",
        }
    }
}

/// Status of the operator resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OperatorStatus {
    /// Generation of the spec last acted on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Conditions reported by every control loop, keyed by type
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Operator version last fully rolled out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Ready replicas of the operand
    #[serde(default)]
    pub ready_replicas: i32,
}

impl OperatorStatus {
    /// Look up a condition by type
    #[must_use]
    pub fn condition(&self, r#type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == r#type)
    }
}

//! # Infrastructure
//!
//! Cluster-wide infrastructure description. The operator only reads the
//! topology fields of its status.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Infrastructure Custom Resource Definition (read-only to this operator)
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Infrastructure",
    group = "config.openshift.io",
    version = "v1",
    status = "crate::crd::InfrastructureStatus",
    plural = "infrastructures"
)]
pub struct InfrastructureSpec {}

/// Topology as observed by the installer
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureStatus {
    /// Where control-plane workloads run
    /// Values: HighlyAvailable, SingleReplica, External
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_topology: Option<String>,
    /// Where infrastructure workloads run
    /// Values: HighlyAvailable, SingleReplica
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_topology: Option<String>,
}

/// Topology class of a set of nodes
///
/// Kept as a parsed view over the raw strings so that values introduced by a
/// newer cluster do not break deserialization of the whole object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopologyMode {
    HighlyAvailable,
    SingleReplica,
    External,
}

impl FromStr for TopologyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HighlyAvailable" => Ok(TopologyMode::HighlyAvailable),
            "SingleReplica" => Ok(TopologyMode::SingleReplica),
            "External" => Ok(TopologyMode::External),
            other => Err(format!("unknown topology mode: {other}")),
        }
    }
}

impl InfrastructureStatus {
    /// Parsed control-plane topology; `None` when unset or unrecognised
    #[must_use]
    pub fn control_plane_mode(&self) -> Option<TopologyMode> {
        self.control_plane_topology
            .as_deref()
            .and_then(|s| s.parse().ok())
    }

    /// Parsed infrastructure topology; `None` when unset or unrecognised
    #[must_use]
    pub fn infrastructure_mode(&self) -> Option<TopologyMode> {
        self.infrastructure_topology
            .as_deref()
            .and_then(|s| s.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_topology_modes() {
        let status = InfrastructureStatus {
            control_plane_topology: Some("External".to_string()),
            infrastructure_topology: Some("SingleReplica".to_string()),
        };
        assert_eq!(status.control_plane_mode(), Some(TopologyMode::External));
        assert_eq!(
            status.infrastructure_mode(),
            Some(TopologyMode::SingleReplica)
        );
    }

    #[test]
    fn test_unknown_topology_is_none() {
        let status = InfrastructureStatus {
            control_plane_topology: Some("Galactic".to_string()),
            infrastructure_topology: None,
        };
        assert_eq!(status.control_plane_mode(), None);
        assert_eq!(status.infrastructure_mode(), None);
    }

    #[test]
    fn test_deserialize_status() {
        let status: InfrastructureStatus = serde_json::from_str(
            r#"{"controlPlaneTopology":"SingleReplica","infrastructureTopology":"SingleReplica"}"#,
        )
        .unwrap();
        assert_eq!(status.control_plane_mode(), Some(TopologyMode::SingleReplica));
    }
}

//! Common test utilities for integration tests
//!
//! Topology snapshots and operator statuses shared by the test files.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use csi_snapshot_controller_operator::controller::status::set_condition;
use csi_snapshot_controller_operator::controller::topology::{NodeInfo, TopologySnapshot};
use csi_snapshot_controller_operator::crd::{
    Condition, ConditionStatus, OperatorStatus, TopologyMode,
};

pub const MASTER_LABEL: &str = "node-role.kubernetes.io/master";

pub const NOW: &str = "2026-01-01T00:00:00Z";

/// `count` nodes carrying the master role label
pub fn masters(count: usize) -> Vec<NodeInfo> {
    (0..count)
        .map(|i| NodeInfo::new(format!("master-{i}")).with_label(MASTER_LABEL, ""))
        .collect()
}

/// Snapshot with both topology fields set to `mode`
pub fn cluster(mode: TopologyMode, nodes: Vec<NodeInfo>) -> TopologySnapshot {
    TopologySnapshot {
        infrastructure_present: true,
        control_plane_topology: Some(mode),
        infrastructure_topology: Some(mode),
        nodes,
    }
}

pub fn single_node() -> TopologySnapshot {
    cluster(TopologyMode::SingleReplica, masters(1))
}

pub fn highly_available() -> TopologySnapshot {
    cluster(TopologyMode::HighlyAvailable, masters(3))
}

/// Record a condition on `status`
pub fn report(status: &mut OperatorStatus, r#type: &str, value: ConditionStatus, reason: &str) {
    set_condition(
        &mut status.conditions,
        Condition::new(r#type, value).with_reason(reason),
        NOW,
    );
}

//! # Topology
//!
//! Read-only view of the cluster shape, derived once per reconcile.
//!
//! A snapshot is never cached across reconciles. Every predicate evaluated in
//! one pass reads the same snapshot value, so two related decisions can never
//! see two different states of the cluster.

use crate::crd::{InfrastructureStatus, TopologyMode};
use std::collections::BTreeMap;

/// A node and its labels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

impl NodeInfo {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Whether every selector entry is present on the node with the same value
    #[must_use]
    pub fn matches(&self, selector: &BTreeMap<String, String>) -> bool {
        selector
            .iter()
            .all(|(key, value)| self.labels.get(key) == Some(value))
    }
}

/// Outcome of the single-node precheck
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleNodeCheck {
    SingleNode,
    MultiNode,
    /// Topology is not known yet
    Indeterminate,
}

/// Cluster shape at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologySnapshot {
    /// Whether the Infrastructure object existed when the snapshot was taken
    pub infrastructure_present: bool,
    /// Control-plane topology; `None` when the Infrastructure object is missing,
    /// the field is unset, or it holds a value this operator does not know
    pub control_plane_topology: Option<TopologyMode>,
    /// Infrastructure topology; `None` when the Infrastructure object is missing or unset
    pub infrastructure_topology: Option<TopologyMode>,
    pub nodes: Vec<NodeInfo>,
}

impl TopologySnapshot {
    /// Snapshot of a cluster whose topology could not be read
    #[must_use]
    pub fn indeterminate() -> Self {
        Self::default()
    }

    /// Snapshot built from the Infrastructure status, `None` when the object does not exist
    #[must_use]
    pub fn observed(infrastructure: Option<&InfrastructureStatus>, nodes: Vec<NodeInfo>) -> Self {
        Self {
            infrastructure_present: infrastructure.is_some(),
            control_plane_topology: infrastructure.and_then(InfrastructureStatus::control_plane_mode),
            infrastructure_topology: infrastructure.and_then(InfrastructureStatus::infrastructure_mode),
            nodes,
        }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Single-node precheck
    ///
    /// Decided by the control-plane topology alone. Indeterminate while that
    /// field is missing or unrecognised.
    #[must_use]
    pub fn single_node(&self) -> SingleNodeCheck {
        match self.control_plane_topology {
            None => SingleNodeCheck::Indeterminate,
            Some(TopologyMode::SingleReplica) => SingleNodeCheck::SingleNode,
            Some(_) => SingleNodeCheck::MultiNode,
        }
    }

    /// Nodes whose labels satisfy a node selector; an empty selector matches every node
    pub fn nodes_matching<'a>(
        &'a self,
        selector: &'a BTreeMap<String, String>,
    ) -> impl Iterator<Item = &'a NodeInfo> + 'a {
        self.nodes.iter().filter(move |node| node.matches(selector))
    }
}

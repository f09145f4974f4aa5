//! # Resource Sets
//!
//! Named groups of static manifests and the selector deciding which groups
//! are in scope for one reconcile.
//!
//! Conditional sets carry a predicate over a [`TopologySnapshot`]. Both halves
//! of a mutually exclusive pair are evaluated against the same snapshot value.
//! An indeterminate predicate never enables a set; the set is skipped for
//! this pass and left as it is in the cluster.

use crate::controller::topology::{SingleNodeCheck, TopologySnapshot};
use crate::observability::metrics;
use tracing::debug;

/// Outcome of a membership predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    Enabled,
    Disabled,
    Indeterminate,
}

/// Membership predicate of a conditional set
pub type Predicate = fn(&TopologySnapshot) -> Precondition;

/// Enabled on clusters with more than one control-plane node
pub fn multi_node_only(topology: &TopologySnapshot) -> Precondition {
    match topology.single_node() {
        SingleNodeCheck::MultiNode => Precondition::Enabled,
        SingleNodeCheck::SingleNode => Precondition::Disabled,
        SingleNodeCheck::Indeterminate => Precondition::Indeterminate,
    }
}

/// Enabled on single-node clusters
pub fn single_node_only(topology: &TopologySnapshot) -> Precondition {
    match topology.single_node() {
        SingleNodeCheck::SingleNode => Precondition::Enabled,
        SingleNodeCheck::MultiNode => Precondition::Disabled,
        SingleNodeCheck::Indeterminate => Precondition::Indeterminate,
    }
}

/// A named group of manifests
#[derive(Debug, Clone)]
pub struct ResourceSet {
    pub name: &'static str,
    pub files: Vec<&'static str>,
    /// `None` for sets that always apply
    pub predicate: Option<Predicate>,
}

impl ResourceSet {
    /// A set that is always applied
    #[must_use]
    pub fn unconditional(name: &'static str, files: Vec<&'static str>) -> Self {
        Self {
            name,
            files,
            predicate: None,
        }
    }

    /// A set that is applied while `predicate` holds and removed once it stops holding
    #[must_use]
    pub fn conditional(name: &'static str, files: Vec<&'static str>, predicate: Predicate) -> Self {
        Self {
            name,
            files,
            predicate: Some(predicate),
        }
    }

    #[must_use]
    pub fn evaluate(&self, topology: &TopologySnapshot) -> Precondition {
        match self.predicate {
            None => Precondition::Enabled,
            Some(predicate) => predicate(topology),
        }
    }
}

/// Which sets to apply, which to remove and which to leave alone
#[derive(Debug, Clone, Default)]
pub struct Selection<'a> {
    pub apply: Vec<&'a ResourceSet>,
    pub remove: Vec<&'a ResourceSet>,
    pub skipped: Vec<&'a ResourceSet>,
}

impl Selection<'_> {
    /// Names of the sets to apply
    pub fn applied_names(&self) -> Vec<&'static str> {
        self.apply.iter().map(|set| set.name).collect()
    }

    pub fn removed_names(&self) -> Vec<&'static str> {
        self.remove.iter().map(|set| set.name).collect()
    }

    pub fn skipped_names(&self) -> Vec<&'static str> {
        self.skipped.iter().map(|set| set.name).collect()
    }
}

/// Evaluates resource sets against a topology snapshot
#[derive(Debug, Clone, Default)]
pub struct ResourceSelector {
    sets: Vec<ResourceSet>,
}

impl ResourceSelector {
    #[must_use]
    pub fn new(sets: Vec<ResourceSet>) -> Self {
        Self { sets }
    }

    /// Static manifests and the disruption budgets that only make sense with more than one node
    #[must_use]
    pub fn standard() -> Self {
        Self::new(vec![
            ResourceSet::unconditional(
                "snapshot-crds",
                vec![
                    "volumesnapshots.yaml",
                    "volumesnapshotcontents.yaml",
                    "volumesnapshotclasses.yaml",
                ],
            ),
            ResourceSet::unconditional("webhook-config", vec!["webhook_config.yaml"]),
            ResourceSet::conditional(
                "pod-disruption-budgets",
                vec![
                    "csi_controller_deployment_pdb.yaml",
                    "webhook_deployment_pdb.yaml",
                ],
                multi_node_only,
            ),
        ])
    }

    pub fn sets(&self) -> &[ResourceSet] {
        &self.sets
    }

    /// Evaluate every set against one snapshot
    pub fn selected<'a>(&'a self, topology: &TopologySnapshot) -> Selection<'a> {
        let mut selection = Selection::default();
        for set in &self.sets {
            match set.evaluate(topology) {
                Precondition::Enabled => selection.apply.push(set),
                Precondition::Disabled => selection.remove.push(set),
                Precondition::Indeterminate => {
                    debug!(
                        set = set.name,
                        "topology precheck did not succeed, skipping resource set"
                    );
                    metrics::increment_resource_sets_skipped(set.name);
                    selection.skipped.push(set);
                }
            }
        }
        selection
    }
}

//! # Resource Selection Tests
//!
//! Conditional resource sets against the topologies a cluster can report.

mod common;

use common::{cluster, highly_available, masters, single_node};
use csi_snapshot_controller_operator::assets;
use csi_snapshot_controller_operator::controller::resources::{
    multi_node_only, single_node_only, Precondition, ResourceSelector, ResourceSet,
};
use csi_snapshot_controller_operator::controller::topology::TopologySnapshot;
use csi_snapshot_controller_operator::crd::{InfrastructureStatus, TopologyMode};
use proptest::prelude::*;

fn paired() -> ResourceSelector {
    ResourceSelector::new(vec![
        ResourceSet::unconditional("always", vec!["volumesnapshots.yaml"]),
        ResourceSet::conditional("multi", vec!["webhook_deployment_pdb.yaml"], multi_node_only),
        ResourceSet::conditional("single", vec!["webhook_config.yaml"], single_node_only),
    ])
}

#[test]
fn test_every_standard_file_is_embedded() {
    for set in ResourceSelector::standard().sets() {
        for file in &set.files {
            assert!(
                !assets::read_file(file).unwrap().is_empty(),
                "{file} is empty"
            );
        }
    }
}

#[test]
fn test_multi_node_cluster_applies_disruption_budgets() {
    let selector = ResourceSelector::standard();
    let selection = selector.selected(&highly_available());
    assert_eq!(
        selection.applied_names(),
        vec!["snapshot-crds", "webhook-config", "pod-disruption-budgets"]
    );
    assert!(selection.removed_names().is_empty());
    assert!(selection.skipped_names().is_empty());
}

#[test]
fn test_single_node_cluster_removes_disruption_budgets() {
    let selector = ResourceSelector::standard();
    let selection = selector.selected(&single_node());
    assert_eq!(selection.applied_names(), vec!["snapshot-crds", "webhook-config"]);
    assert_eq!(selection.removed_names(), vec!["pod-disruption-budgets"]);
}

#[test]
fn test_unknown_topology_leaves_conditional_sets_alone() {
    let selector = ResourceSelector::standard();
    let selection = selector.selected(&TopologySnapshot::indeterminate());
    assert_eq!(selection.applied_names(), vec!["snapshot-crds", "webhook-config"]);
    assert!(selection.removed_names().is_empty());
    assert_eq!(selection.skipped_names(), vec!["pod-disruption-budgets"]);
}

#[test]
fn test_mutually_exclusive_sets_flip_together() {
    let selector = paired();

    let ha = selector.selected(&highly_available());
    assert_eq!(ha.applied_names(), vec!["always", "multi"]);
    assert_eq!(ha.removed_names(), vec!["single"]);

    let sno = selector.selected(&single_node());
    assert_eq!(sno.applied_names(), vec!["always", "single"]);
    assert_eq!(sno.removed_names(), vec!["multi"]);
}

fn topology_mode() -> impl Strategy<Value = Option<TopologyMode>> {
    prop_oneof![
        Just(None),
        Just(Some(TopologyMode::HighlyAvailable)),
        Just(Some(TopologyMode::SingleReplica)),
        Just(Some(TopologyMode::External)),
    ]
}

proptest! {
    #[test]
    fn prop_exclusive_sets_never_both_enabled(
        control_plane in topology_mode(),
        infrastructure in topology_mode(),
        nodes in 0usize..5,
    ) {
        let topology = TopologySnapshot {
            infrastructure_present: true,
            control_plane_topology: control_plane,
            infrastructure_topology: infrastructure,
            nodes: masters(nodes),
        };
        let multi = multi_node_only(&topology);
        let single = single_node_only(&topology);
        prop_assert!(!(multi == Precondition::Enabled && single == Precondition::Enabled));
        let expected = match control_plane {
            None => (Precondition::Indeterminate, Precondition::Indeterminate),
            Some(TopologyMode::SingleReplica) => (Precondition::Disabled, Precondition::Enabled),
            Some(_) => (Precondition::Enabled, Precondition::Disabled),
        };
        prop_assert_eq!((multi, single), expected);

        let selector = paired();
        let selection = selector.selected(&topology);
        let total = selection.apply.len() + selection.remove.len() + selection.skipped.len();
        prop_assert_eq!(total, 3);
        prop_assert!(selection.applied_names().contains(&"always"));
    }
}

#[test]
fn test_single_replica_control_plane_is_single_node_regardless_of_nodes() {
    let topology = cluster(TopologyMode::SingleReplica, masters(3));
    assert_eq!(multi_node_only(&topology), Precondition::Disabled);
    assert_eq!(single_node_only(&topology), Precondition::Enabled);
}

#[test]
fn test_unrecognised_control_plane_skips_disruption_budgets() {
    let status: InfrastructureStatus = serde_json::from_str(
        r#"{"controlPlaneTopology":"Galactic","infrastructureTopology":"HighlyAvailable"}"#,
    )
    .unwrap();
    let topology = TopologySnapshot::observed(Some(&status), masters(3));

    let selector = ResourceSelector::standard();
    let selection = selector.selected(&topology);
    assert_eq!(selection.applied_names(), vec!["snapshot-crds", "webhook-config"]);
    assert!(selection.removed_names().is_empty());
    assert_eq!(selection.skipped_names(), vec!["pod-disruption-budgets"]);
}

#[test]
fn test_unset_control_plane_with_known_infrastructure_is_indeterminate() {
    let topology = TopologySnapshot {
        infrastructure_present: true,
        control_plane_topology: None,
        infrastructure_topology: Some(TopologyMode::HighlyAvailable),
        nodes: masters(3),
    };
    assert_eq!(multi_node_only(&topology), Precondition::Indeterminate);
    assert_eq!(single_node_only(&topology), Precondition::Indeterminate);
}

//! # Status Aggregation Tests
//!
//! Folding per-controller conditions into the ClusterOperator status over
//! several passes, the way the status controller runs it.

mod common;

use common::{report, NOW};
use csi_snapshot_controller_operator::constants::{OPERAND_VERSION_NAME, OPERATOR_VERSION_NAME};
use csi_snapshot_controller_operator::controller::cluster_operator::{
    aggregate, merge_versions, related_objects, AggregationInput,
};
use csi_snapshot_controller_operator::crd::{
    ClusterOperatorStatus, Condition, ConditionStatus, ManagementState, OperandVersion,
    OperatorStatus,
};
use std::collections::BTreeMap;

const REQUIRED: [&str; 2] = ["CSISnapshotController", "CSISnapshotWebhookController"];

fn targets() -> BTreeMap<String, String> {
    BTreeMap::from([
        (OPERATOR_VERSION_NAME.to_string(), "4.17.0".to_string()),
        (OPERAND_VERSION_NAME.to_string(), "4.17.0".to_string()),
    ])
}

fn run(
    operator: &OperatorStatus,
    state: ManagementState,
    recorded: &BTreeMap<String, String>,
    existing: &ClusterOperatorStatus,
) -> ClusterOperatorStatus {
    let targets = targets();
    let related = related_objects(&["openshift-cluster-storage-operator"]);
    let input = AggregationInput {
        operator,
        management_state: state,
        required_available: &REQUIRED,
        recorded_versions: recorded,
        target_versions: &targets,
        related_objects: &related,
    };
    aggregate(&input, existing, NOW)
}

fn status_of(status: &ClusterOperatorStatus, r#type: &str) -> ConditionStatus {
    status.condition(r#type).map(|c| c.status).unwrap()
}

/// One deployment reports Available, the other keeps rolling out
fn stuck_rollout() -> OperatorStatus {
    let mut operator = OperatorStatus::default();
    report(&mut operator, "CSISnapshotControllerAvailable", ConditionStatus::True, "AsExpected");
    report(&mut operator, "CSISnapshotControllerProgressing", ConditionStatus::False, "AsExpected");
    report(&mut operator, "CSISnapshotWebhookControllerAvailable", ConditionStatus::False, "Deploying");
    report(&mut operator, "CSISnapshotWebhookControllerProgressing", ConditionStatus::True, "Deploying");
    operator
}

#[test]
fn test_stuck_rollout_never_reports_available() {
    let operator = stuck_rollout();
    let recorded = BTreeMap::new();

    let mut status = ClusterOperatorStatus::default();
    for _ in 0..10 {
        status = run(&operator, ManagementState::Managed, &recorded, &status);
        assert_eq!(status_of(&status, "Available"), ConditionStatus::False);
        assert_eq!(status_of(&status, "Progressing"), ConditionStatus::True);
    }

    let available = status.condition("Available").unwrap();
    assert_eq!(
        available.reason.as_deref(),
        Some("CSISnapshotWebhookController_Deploying")
    );
}

#[test]
fn test_converged_rollout_is_available() {
    let mut operator = stuck_rollout();
    report(&mut operator, "CSISnapshotWebhookControllerAvailable", ConditionStatus::True, "AsExpected");
    report(&mut operator, "CSISnapshotWebhookControllerProgressing", ConditionStatus::False, "AsExpected");
    report(&mut operator, "CSISnapshotControllerUpgradeable", ConditionStatus::True, "AsExpected");

    let status = run(
        &operator,
        ManagementState::Managed,
        &targets(),
        &ClusterOperatorStatus::default(),
    );
    assert_eq!(status_of(&status, "Available"), ConditionStatus::True);
    assert_eq!(status_of(&status, "Progressing"), ConditionStatus::False);
    assert_eq!(status_of(&status, "Degraded"), ConditionStatus::False);
    assert_eq!(status_of(&status, "Upgradeable"), ConditionStatus::True);
    assert_eq!(status.version(OPERATOR_VERSION_NAME), Some("4.17.0"));
    assert_eq!(status.version(OPERAND_VERSION_NAME), Some("4.17.0"));
}

#[test]
fn test_report_order_does_not_matter() {
    let forward = stuck_rollout();
    let mut reversed = forward.clone();
    reversed.conditions.reverse();

    let recorded = BTreeMap::new();
    let existing = ClusterOperatorStatus::default();
    let a = run(&forward, ManagementState::Managed, &recorded, &existing);
    let b = run(&reversed, ManagementState::Managed, &recorded, &existing);
    for r#type in ["Available", "Progressing", "Degraded", "Upgradeable"] {
        assert_eq!(status_of(&a, r#type), status_of(&b, r#type), "{}", r#type);
    }
}

#[test]
fn test_foreign_conditions_survive_aggregation() {
    let existing = ClusterOperatorStatus {
        conditions: vec![Condition::new("EvaluationConditionsDetected", ConditionStatus::False)],
        ..ClusterOperatorStatus::default()
    };
    let status = run(
        &stuck_rollout(),
        ManagementState::Managed,
        &BTreeMap::new(),
        &existing,
    );
    assert!(status.condition("EvaluationConditionsDetected").is_some());
    assert_eq!(status.conditions.len(), 5);
}

#[test]
fn test_unmanaged_reports_unknown_everywhere() {
    let status = run(
        &stuck_rollout(),
        ManagementState::Unmanaged,
        &BTreeMap::new(),
        &ClusterOperatorStatus::default(),
    );
    for r#type in ["Available", "Progressing", "Degraded", "Upgradeable"] {
        let condition = status.condition(r#type).unwrap();
        assert_eq!(condition.status, ConditionStatus::Unknown);
        assert_eq!(condition.reason.as_deref(), Some("Unmanaged"));
    }
}

#[test]
fn test_restart_keeps_reported_versions() {
    let existing = vec![OperandVersion {
        name: OPERATOR_VERSION_NAME.to_string(),
        version: "4.17.0".to_string(),
    }];
    let merged = merge_versions(&existing, &BTreeMap::new(), &targets());
    assert_eq!(merged, existing);

    let stale = BTreeMap::from([(OPERATOR_VERSION_NAME.to_string(), "4.16.0".to_string())]);
    let merged = merge_versions(&existing, &stale, &targets());
    assert_eq!(merged[0].version, "4.17.0");
}

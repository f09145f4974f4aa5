//! # ClusterOperator Status
//!
//! Folds the per-controller conditions on the operator resource into the
//! four conditions of the `ClusterOperator` object, together with versions
//! and related objects.
//!
//! ## Merge rules
//!
//! Conditions are matched by type suffix:
//!
//! - `Degraded` is True when any `*Degraded` condition is True
//! - `Progressing` is True when any `*Progressing` condition is True
//! - `Available` is True only when every required controller reports
//!   `<Name>Available=True` and no `*Available` condition is False
//! - `Upgradeable` is False when any `*Upgradeable` condition is False
//!
//! The result is computed from current state on every pass, so the order in
//! which controllers report does not matter. Conditions of types this module
//! does not own are carried over untouched.
//!
//! ## Versions
//!
//! A version moves to its target once the [`VersionGetter`] has recorded it.
//! A version already at target is never rewritten, so an empty getter after a
//! restart does not erase what was reported.

use crate::client::{ClientError, ClusterOperatorClient, OperatorClient};
use crate::config::OperatorConfig;
use crate::constants::{
    OPERAND_VERSION_NAME, OPERATOR_CR_NAME, OPERATOR_VERSION_NAME, REASON_AS_EXPECTED,
    TARGET_NAME, TARGET_NAMESPACE,
};
use crate::controller::base::{Reconcile, SyncError};
use crate::controller::events::ResourceKind;
use crate::controller::status::{self, retry_on_conflict, ConflictRetry};
use crate::controller::version::VersionGetter;
use crate::crd::{
    ClusterOperator, ClusterOperatorSpec, ClusterOperatorStatus, Condition, ConditionStatus,
    ManagementState, ObjectReference, OperandVersion, OperatorStatus,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub const AVAILABLE: &str = "Available";
pub const PROGRESSING: &str = "Progressing";
pub const DEGRADED: &str = "Degraded";
pub const UPGRADEABLE: &str = "Upgradeable";

/// Reason on every condition while the operator is unmanaged
pub const REASON_UNMANAGED: &str = "Unmanaged";

/// Everything one aggregation pass reads
#[derive(Debug, Clone, Copy)]
pub struct AggregationInput<'a> {
    /// Conditions reported on the operator resource
    pub operator: &'a OperatorStatus,
    pub management_state: ManagementState,
    /// Controllers whose `<Name>Available` must be True for `Available`
    pub required_available: &'a [&'a str],
    /// Versions recorded as rolled out
    pub recorded_versions: &'a BTreeMap<String, String>,
    /// Versions the operator is rolling out to
    pub target_versions: &'a BTreeMap<String, String>,
    pub related_objects: &'a [ObjectReference],
}

/// Conditions on `status` whose type ends with `suffix`, excluding the bare suffix
fn with_suffix<'a>(
    status: &'a OperatorStatus,
    suffix: &'a str,
) -> impl Iterator<Item = &'a Condition> + 'a {
    status
        .conditions
        .iter()
        .filter(move |c| c.r#type.ends_with(suffix) && c.r#type != suffix)
}

/// `{Controller}_{reason}` joined with `::`, and `{type}: {message}` lines
fn summarize<'a>(suffix: &str, conditions: impl Iterator<Item = &'a Condition>) -> (String, String) {
    let mut reasons = Vec::new();
    let mut messages = Vec::new();
    for condition in conditions {
        let controller = condition.r#type.trim_end_matches(suffix);
        reasons.push(format!(
            "{controller}_{}",
            condition.reason.as_deref().unwrap_or("Unknown")
        ));
        if let Some(message) = &condition.message {
            messages.push(format!("{controller}{suffix}: {message}"));
        }
    }
    (reasons.join("::"), messages.join("\n"))
}

/// `trigger` when any matching condition has it, the opposite status otherwise
fn union(status: &OperatorStatus, suffix: &str, trigger: ConditionStatus) -> Condition {
    let matching: Vec<&Condition> = with_suffix(status, suffix)
        .filter(|c| c.status == trigger)
        .collect();
    if matching.is_empty() {
        let settled = ConditionStatus::from_bool(trigger != ConditionStatus::True);
        return Condition::new(suffix, settled).with_reason(REASON_AS_EXPECTED);
    }
    let (reason, message) = summarize(suffix, matching.into_iter());
    Condition::new(suffix, trigger)
        .with_reason(reason)
        .with_message(message)
}

fn available(status: &OperatorStatus, required: &[&str]) -> Condition {
    let mut blocking: Vec<Condition> = with_suffix(status, AVAILABLE)
        .filter(|c| !c.is_true())
        .cloned()
        .collect();
    for controller in required {
        let r#type = format!("{controller}{AVAILABLE}");
        if status.condition(&r#type).is_none() {
            blocking.push(
                Condition::new(r#type, ConditionStatus::Unknown)
                    .with_reason("NoData")
                    .with_message("waiting for first report"),
            );
        }
    }
    if blocking.is_empty() {
        return Condition::new(AVAILABLE, ConditionStatus::True).with_reason(REASON_AS_EXPECTED);
    }
    let (reason, message) = summarize(AVAILABLE, blocking.iter());
    Condition::new(AVAILABLE, ConditionStatus::False)
        .with_reason(reason)
        .with_message(message)
}

/// Versions to report, never moving a version away from its target
#[must_use]
pub fn merge_versions(
    existing: &[OperandVersion],
    recorded: &BTreeMap<String, String>,
    targets: &BTreeMap<String, String>,
) -> Vec<OperandVersion> {
    let mut merged: BTreeMap<String, String> = existing
        .iter()
        .map(|v| (v.name.clone(), v.version.clone()))
        .collect();
    for (name, version) in recorded {
        let at_target = targets
            .get(name)
            .is_some_and(|target| merged.get(name) == Some(target));
        if at_target {
            continue;
        }
        merged.insert(name.clone(), version.clone());
    }
    merged
        .into_iter()
        .map(|(name, version)| OperandVersion { name, version })
        .collect()
}

/// Related objects: namespaces (deduplicated) and the operator resource
#[must_use]
pub fn related_objects(namespaces: &[&str]) -> Vec<ObjectReference> {
    let mut objects = Vec::new();
    for namespace in namespaces {
        let reference = ObjectReference::namespace(namespace);
        if !objects.contains(&reference) {
            objects.push(reference);
        }
    }
    objects.push(ObjectReference {
        group: "operator.openshift.io".to_string(),
        resource: "csisnapshotcontrollers".to_string(),
        namespace: None,
        name: OPERATOR_CR_NAME.to_string(),
    });
    objects
}

/// Compute the ClusterOperator status from `existing` and the current inputs
#[must_use]
pub fn aggregate(
    input: &AggregationInput<'_>,
    existing: &ClusterOperatorStatus,
    now: &str,
) -> ClusterOperatorStatus {
    let owned = if input.management_state == ManagementState::Unmanaged {
        [AVAILABLE, PROGRESSING, DEGRADED, UPGRADEABLE].map(|r#type| {
            Condition::new(r#type, ConditionStatus::Unknown)
                .with_reason(REASON_UNMANAGED)
                .with_message("the operator is in unmanaged state")
        })
    } else {
        [
            available(input.operator, input.required_available),
            union(input.operator, PROGRESSING, ConditionStatus::True),
            union(input.operator, DEGRADED, ConditionStatus::True),
            union(input.operator, UPGRADEABLE, ConditionStatus::False),
        ]
    };

    let mut conditions = existing.conditions.clone();
    for condition in owned {
        status::set_condition(&mut conditions, condition, now);
    }

    ClusterOperatorStatus {
        conditions,
        versions: merge_versions(
            &existing.versions,
            input.recorded_versions,
            input.target_versions,
        ),
        related_objects: input.related_objects.to_vec(),
    }
}

/// Publishes the aggregated status on the `ClusterOperator` object
pub struct ClusterOperatorReconciler {
    operator: Arc<dyn OperatorClient>,
    cluster_operators: Arc<dyn ClusterOperatorClient>,
    getter: Arc<VersionGetter>,
    required_available: Vec<&'static str>,
    target_versions: BTreeMap<String, String>,
    related: Vec<ObjectReference>,
    retry: ConflictRetry,
}

impl ClusterOperatorReconciler {
    #[must_use]
    pub fn new(
        operator: Arc<dyn OperatorClient>,
        cluster_operators: Arc<dyn ClusterOperatorClient>,
        getter: Arc<VersionGetter>,
        required_available: Vec<&'static str>,
        config: &OperatorConfig,
        retry: ConflictRetry,
    ) -> Self {
        let target_versions = BTreeMap::from([
            (OPERATOR_VERSION_NAME.to_string(), config.operator_version.clone()),
            (OPERAND_VERSION_NAME.to_string(), config.operand_version.clone()),
        ]);
        Self {
            operator,
            cluster_operators,
            getter,
            required_available,
            target_versions,
            related: related_objects(&[TARGET_NAMESPACE, &config.operator_namespace]),
            retry,
        }
    }

    async fn get_or_create(&self) -> Result<ClusterOperator, ClientError> {
        if let Some(existing) = self.cluster_operators.get_cluster_operator(TARGET_NAME).await? {
            return Ok(existing);
        }
        info!(name = TARGET_NAME, "creating ClusterOperator");
        self.cluster_operators
            .create_cluster_operator(&ClusterOperator::new(TARGET_NAME, ClusterOperatorSpec {}))
            .await
    }
}

#[async_trait]
impl Reconcile for ClusterOperatorReconciler {
    fn name(&self) -> &str {
        "ClusterOperatorStatusController"
    }

    fn watches(&self) -> &[ResourceKind] {
        &[ResourceKind::ClusterOperator]
    }

    async fn reconcile(&self, _target: &str) -> Result<(), SyncError> {
        let operator = self.operator.get_operator().await?;
        let operator_status = operator.status.unwrap_or_default();
        let recorded = self.getter.versions();
        let input = AggregationInput {
            operator: &operator_status,
            management_state: operator.spec.management_state,
            required_available: &self.required_available,
            recorded_versions: &recorded,
            target_versions: &self.target_versions,
            related_objects: &self.related,
        };
        let now = status::now();

        let input = &input;
        let now = now.as_str();
        retry_on_conflict(&self.retry, "clusteroperator", move || async move {
            let mut cluster_operator = self.get_or_create().await?;
            let current = cluster_operator.status.clone().unwrap_or_default();
            let desired = aggregate(input, &current, now);
            if desired == current {
                debug!("ClusterOperator status unchanged");
                return Ok(());
            }
            cluster_operator.status = Some(desired);
            self.cluster_operators
                .update_cluster_operator_status(&cluster_operator)
                .await?;
            Ok(())
        })
        .await?;
        Ok(())
    }
}

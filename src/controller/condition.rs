//! # Static Conditions
//!
//! Asserts a fixed set of conditions on the operator resource on every pass.

use crate::client::OperatorClient;
use crate::constants::REASON_AS_EXPECTED;
use crate::controller::base::{Reconcile, SyncError};
use crate::controller::events::ResourceKind;
use crate::controller::management::ManagementGate;
use crate::controller::status::{self, ConflictRetry};
use crate::crd::{Condition, ConditionStatus};
use async_trait::async_trait;
use std::sync::Arc;

/// Conditions asserted by the operator regardless of anything else
#[must_use]
pub fn static_conditions() -> Vec<Condition> {
    vec![
        Condition::new("CSISnapshotControllerUpgradeable", ConditionStatus::True)
            .with_reason(REASON_AS_EXPECTED),
    ]
}

pub struct ConditionReconciler {
    client: Arc<dyn OperatorClient>,
    gate: Arc<ManagementGate>,
    conditions: Vec<Condition>,
    retry: ConflictRetry,
}

impl ConditionReconciler {
    #[must_use]
    pub fn new(
        client: Arc<dyn OperatorClient>,
        gate: Arc<ManagementGate>,
        conditions: Vec<Condition>,
        retry: ConflictRetry,
    ) -> Self {
        Self {
            client,
            gate,
            conditions,
            retry,
        }
    }
}

#[async_trait]
impl Reconcile for ConditionReconciler {
    fn name(&self) -> &str {
        "ConditionController"
    }

    fn watches(&self) -> &[ResourceKind] {
        &[]
    }

    async fn reconcile(&self, _target: &str) -> Result<(), SyncError> {
        let state = self.client.get_operator().await?.spec.management_state;
        if !self.gate.allows_mutation(state) {
            return Ok(());
        }
        let now = status::now();
        status::update_operator_status(self.client.as_ref(), &self.retry, |s| {
            for condition in &self.conditions {
                status::set_condition(&mut s.conditions, condition.clone(), &now);
            }
        })
        .await?;
        Ok(())
    }
}

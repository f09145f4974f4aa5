//! # Management State
//!
//! The management gate and the reconciler reporting on it.
//!
//! [`ManagementGate`] holds the process-wide removability policy. It is set
//! once during startup and shared with every reconciler through an `Arc`;
//! there is no way to change it afterwards.
//!
//! [`ManagementGate::allows_mutation`] is what reconcilers consult before
//! touching the managed workload. `Unmanaged` and `Removed` both block
//! mutation; reporting keeps running in every state.

use crate::client::OperatorClient;
use crate::constants::REASON_AS_EXPECTED;
use crate::controller::base::{Reconcile, SyncError};
use crate::controller::events::ResourceKind;
use crate::controller::status::{self, ConflictRetry};
use crate::crd::{Condition, ConditionStatus, ManagementState};
use async_trait::async_trait;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{debug, warn};

/// Condition reported by [`ManagementStateReconciler`]
pub const MANAGEMENT_STATE_CONDITION: &str = "ManagementStateDegraded";

/// Reason used when removal is requested but not supported
pub const REASON_UNREMOVABLE: &str = "Unremovable";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("management policy already set")]
    AlreadySet,
}

/// Whether the operator supports `managementState: Removed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagementPolicy {
    Removable,
    NotRemovable,
}

/// Process-wide management policy, written once at startup
#[derive(Debug, Default)]
pub struct ManagementGate {
    policy: OnceLock<ManagementPolicy>,
}

impl ManagementGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the operator as not supporting removal
    pub fn set_not_removable(&self) -> Result<(), GateError> {
        self.policy
            .set(ManagementPolicy::NotRemovable)
            .map_err(|_| GateError::AlreadySet)
    }

    /// Operators are removable until told otherwise
    #[must_use]
    pub fn policy(&self) -> ManagementPolicy {
        self.policy
            .get()
            .copied()
            .unwrap_or(ManagementPolicy::Removable)
    }

    #[must_use]
    pub fn is_removable(&self) -> bool {
        self.policy() == ManagementPolicy::Removable
    }

    /// Whether reconcilers may mutate the managed workload in `state`
    #[must_use]
    pub fn allows_mutation(&self, state: ManagementState) -> bool {
        match state {
            ManagementState::Managed | ManagementState::Force => true,
            ManagementState::Unmanaged | ManagementState::Removed => false,
        }
    }
}

/// Condition describing whether `state` is supported under `gate`
#[must_use]
pub fn management_condition(gate: &ManagementGate, state: ManagementState) -> Condition {
    match state {
        ManagementState::Removed if !gate.is_removable() => {
            Condition::new(MANAGEMENT_STATE_CONDITION, ConditionStatus::True)
                .with_reason(REASON_UNREMOVABLE)
                .with_message("the operator cannot be removed")
        }
        _ => Condition::new(MANAGEMENT_STATE_CONDITION, ConditionStatus::False)
            .with_reason(REASON_AS_EXPECTED),
    }
}

/// Reports whether the requested management state is supported
pub struct ManagementStateReconciler {
    client: Arc<dyn OperatorClient>,
    gate: Arc<ManagementGate>,
    retry: ConflictRetry,
}

impl ManagementStateReconciler {
    #[must_use]
    pub fn new(client: Arc<dyn OperatorClient>, gate: Arc<ManagementGate>, retry: ConflictRetry) -> Self {
        Self {
            client,
            gate,
            retry,
        }
    }
}

#[async_trait]
impl Reconcile for ManagementStateReconciler {
    fn name(&self) -> &str {
        "ManagementStateController"
    }

    fn watches(&self) -> &[ResourceKind] {
        &[]
    }

    async fn reconcile(&self, _target: &str) -> Result<(), SyncError> {
        let operator = self.client.get_operator().await?;
        let state = operator.spec.management_state;
        let condition = management_condition(&self.gate, state);
        if condition.is_true() {
            warn!(
                management_state = state.as_str(),
                "requested management state is not supported"
            );
        } else {
            debug!(management_state = state.as_str(), "management state supported");
        }

        let now = status::now();
        status::update_operator_status(self.client.as_ref(), &self.retry, |s| {
            status::set_condition(&mut s.conditions, condition.clone(), &now);
        })
        .await?;
        Ok(())
    }
}

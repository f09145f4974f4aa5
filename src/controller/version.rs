//! # Versions
//!
//! [`VersionGetter`] is the in-process record of which component versions are
//! fully rolled out. [`VersionReconciler`] writes to it once both deployments
//! have converged; the ClusterOperator aggregator reads from it.

use crate::client::OperatorClient;
use crate::constants::{OPERAND_VERSION_NAME, OPERATOR_VERSION_NAME};
use crate::controller::base::{Reconcile, SyncError};
use crate::controller::events::{ChangeNotifier, ResourceKind};
use crate::controller::management::ManagementGate;
use crate::crd::OperatorStatus;
use async_trait::async_trait;
use futures::channel::mpsc;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Rolled-out component versions, shared between controllers
#[derive(Debug, Default)]
pub struct VersionGetter {
    versions: RwLock<BTreeMap<String, String>>,
    changes: ChangeNotifier,
}

impl VersionGetter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream with one item per recorded change
    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<()> {
        self.changes.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.changes.subscriber_count()
    }

    /// Record a version; subscribers are notified only when it changed
    pub fn set_version(&self, name: &str, version: &str) {
        let changed = {
            let mut versions = self.versions.write().unwrap_or_else(PoisonError::into_inner);
            versions.insert(name.to_string(), version.to_string()).as_deref() != Some(version)
        };
        if changed {
            info!(component = name, version = version, "version recorded");
            self.changes.notify();
        }
    }

    #[must_use]
    pub fn versions(&self) -> BTreeMap<String, String> {
        self.versions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Whether every listed deployment controller reports a finished rollout
#[must_use]
pub fn rolled_out(status: &OperatorStatus, controllers: &[&str]) -> bool {
    controllers.iter().all(|controller| {
        let available = status
            .condition(&format!("{controller}Available"))
            .is_some_and(|c| c.is_true());
        let progressing = status
            .condition(&format!("{controller}Progressing"))
            .is_some_and(|c| c.is_false());
        available && progressing
    })
}

/// Records target versions once the deployments have converged
pub struct VersionReconciler {
    client: Arc<dyn OperatorClient>,
    getter: Arc<VersionGetter>,
    gate: Arc<ManagementGate>,
    /// Deployment controllers that must have converged
    controllers: Vec<&'static str>,
    operator_version: String,
    operand_version: String,
}

impl VersionReconciler {
    #[must_use]
    pub fn new(
        client: Arc<dyn OperatorClient>,
        getter: Arc<VersionGetter>,
        gate: Arc<ManagementGate>,
        controllers: Vec<&'static str>,
        operator_version: String,
        operand_version: String,
    ) -> Self {
        Self {
            client,
            getter,
            gate,
            controllers,
            operator_version,
            operand_version,
        }
    }
}

#[async_trait]
impl Reconcile for VersionReconciler {
    fn name(&self) -> &str {
        "VersionController"
    }

    fn watches(&self) -> &[ResourceKind] {
        &[]
    }

    async fn reconcile(&self, _target: &str) -> Result<(), SyncError> {
        let operator = self.client.get_operator().await?;
        if !self.gate.allows_mutation(operator.spec.management_state) {
            return Ok(());
        }
        let status = operator.status.unwrap_or_default();
        if !rolled_out(&status, &self.controllers) {
            debug!("deployments still rolling out, versions not recorded");
            return Ok(());
        }
        self.getter
            .set_version(OPERATOR_VERSION_NAME, &self.operator_version);
        self.getter
            .set_version(OPERAND_VERSION_NAME, &self.operand_version);
        Ok(())
    }
}

//! # Static Resources
//!
//! Applies the snapshot CRDs, the webhook configuration and whichever
//! conditional sets the topology calls for.
//!
//! Every file is attempted even when an earlier one fails; the failures are
//! returned together so one broken manifest does not hide the others.

use crate::assets;
use crate::client::{parse_manifest, OperatorClient, ResourceApplier, TopologySource};
use crate::controller::base::{Reconcile, SyncError};
use crate::controller::events::ResourceKind;
use crate::controller::management::ManagementGate;
use crate::controller::resources::ResourceSelector;
use crate::controller::topology::TopologySnapshot;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Applies and removes the static resource sets
pub struct StaticResourcesReconciler {
    selector: ResourceSelector,
    operator: Arc<dyn OperatorClient>,
    applier: Arc<dyn ResourceApplier>,
    topology: Arc<dyn TopologySource>,
    gate: Arc<ManagementGate>,
}

impl StaticResourcesReconciler {
    #[must_use]
    pub fn new(
        selector: ResourceSelector,
        operator: Arc<dyn OperatorClient>,
        applier: Arc<dyn ResourceApplier>,
        topology: Arc<dyn TopologySource>,
        gate: Arc<ManagementGate>,
    ) -> Self {
        Self {
            selector,
            operator,
            applier,
            topology,
            gate,
        }
    }

    /// One topology read per pass; a failed read leaves conditional sets alone
    async fn snapshot(&self) -> TopologySnapshot {
        match self.topology.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(error = %e, "failed to read topology, conditional sets are skipped");
                TopologySnapshot::indeterminate()
            }
        }
    }

    async fn apply_file(&self, file: &str) -> Result<(), SyncError> {
        let object = parse_manifest(assets::read_file(file)?)?;
        self.applier.apply_object(&object).await?;
        Ok(())
    }

    async fn remove_file(&self, file: &str) -> Result<(), SyncError> {
        let object = parse_manifest(assets::read_file(file)?)?;
        match self.applier.delete_object(&object).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other.map_err(SyncError::from),
        }
    }
}

#[async_trait]
impl Reconcile for StaticResourcesReconciler {
    fn name(&self) -> &str {
        "StaticResourcesController"
    }

    fn watches(&self) -> &[ResourceKind] {
        &[
            ResourceKind::Node,
            ResourceKind::Infrastructure,
        ]
    }

    async fn reconcile(&self, _target: &str) -> Result<(), SyncError> {
        let state = self.operator.get_operator().await?.spec.management_state;
        if !self.gate.allows_mutation(state) {
            debug!(
                management_state = state.as_str(),
                "management state blocks changes, skipping"
            );
            return Ok(());
        }

        let topology = self.snapshot().await;
        let selection = self.selector.selected(&topology);

        let mut errors = Vec::new();
        for set in &selection.apply {
            for file in &set.files {
                if let Err(e) = self.apply_file(file).await {
                    errors.push(e);
                }
            }
        }
        for set in &selection.remove {
            for file in &set.files {
                if let Err(e) = self.remove_file(file).await {
                    errors.push(e);
                }
            }
        }

        match SyncError::aggregate(errors) {
            Some(e) => Err(e),
            None => {
                info!(
                    applied = ?selection.applied_names(),
                    removed = ?selection.removed_names(),
                    skipped = ?selection.skipped_names(),
                    "static resources synced"
                );
                Ok(())
            }
        }
    }
}

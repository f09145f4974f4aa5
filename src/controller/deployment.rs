//! # Deployment Reconciler
//!
//! Renders a deployment template through the hook pipeline, applies it and
//! reports `<Name>Available` / `<Name>Progressing` on the operator resource.
//!
//! Two instances run: one for the snapshot controller itself and one for its
//! admission webhook. They differ only in template, image token and name.

use crate::assets;
use crate::client::{OperatorClient, ResourceApplier, TopologySource};
use crate::config::OperatorConfig;
use crate::constants::{OPERAND_IMAGE_TOKEN, REASON_AS_EXPECTED, WEBHOOK_IMAGE_TOKEN};
use crate::controller::base::{Reconcile, SyncError};
use crate::controller::events::{ClusterEvent, ResourceKind};
use crate::controller::hooks::{HookError, ManifestPipeline};
use crate::controller::management::ManagementGate;
use crate::controller::status::{self, ConflictRetry};
use crate::crd::{Condition, ConditionStatus};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use std::sync::Arc;
use tracing::{debug, info};

/// Reason used while a deployment has not converged
pub const REASON_DEPLOYING: &str = "Deploying";

/// Static description of one managed deployment
#[derive(Debug, Clone)]
pub struct DeploymentTarget {
    /// Controller name and condition prefix
    pub controller: &'static str,
    /// Name of the deployment object
    pub deployment: &'static str,
    /// Asset holding the template
    pub asset: &'static str,
    /// Image tokens substituted into the template
    pub images: Vec<(String, String)>,
    /// Whether ready replicas are mirrored into the operator status
    pub reports_ready_replicas: bool,
}

impl DeploymentTarget {
    /// The snapshot controller deployment
    #[must_use]
    pub fn operand(config: &OperatorConfig) -> Self {
        Self {
            controller: "CSISnapshotController",
            deployment: "csi-snapshot-controller",
            asset: "csi_controller_deployment.yaml",
            images: vec![(OPERAND_IMAGE_TOKEN.to_string(), config.operand_image.clone())],
            reports_ready_replicas: true,
        }
    }

    /// The admission webhook deployment
    #[must_use]
    pub fn webhook(config: &OperatorConfig) -> Self {
        Self {
            controller: "CSISnapshotWebhookController",
            deployment: "csi-snapshot-webhook",
            asset: "webhook_deployment.yaml",
            images: vec![(WEBHOOK_IMAGE_TOKEN.to_string(), config.webhook_image.clone())],
            reports_ready_replicas: false,
        }
    }
}

/// Available and Progressing conditions for a live deployment
#[must_use]
pub fn deployment_conditions(controller: &str, deployment: &Deployment) -> [Condition; 2] {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let generation = deployment.metadata.generation.unwrap_or(0);
    let status = deployment.status.clone().unwrap_or_default();
    let available = status.available_replicas.unwrap_or(0);
    let updated = status.updated_replicas.unwrap_or(0);
    let observed = status.observed_generation.unwrap_or(0);

    let available_condition = if available > 0 {
        Condition::new(format!("{controller}Available"), ConditionStatus::True)
            .with_reason(REASON_AS_EXPECTED)
    } else {
        Condition::new(format!("{controller}Available"), ConditionStatus::False)
            .with_reason(REASON_DEPLOYING)
            .with_message("Waiting for Deployment to deploy pods")
    };

    let progressing_condition = if observed < generation {
        Condition::new(format!("{controller}Progressing"), ConditionStatus::True)
            .with_reason(REASON_DEPLOYING)
            .with_message("Waiting for Deployment to act on changes")
    } else if updated < desired || available < desired {
        Condition::new(format!("{controller}Progressing"), ConditionStatus::True)
            .with_reason(REASON_DEPLOYING)
            .with_message(format!(
                "Waiting for Deployment to deploy pods: {available} of {desired} available"
            ))
    } else {
        Condition::new(format!("{controller}Progressing"), ConditionStatus::False)
            .with_reason(REASON_AS_EXPECTED)
    };

    [available_condition, progressing_condition]
}

/// Reconciles one deployment
pub struct DeploymentReconciler {
    target: DeploymentTarget,
    pipeline: ManifestPipeline,
    operator: Arc<dyn OperatorClient>,
    applier: Arc<dyn ResourceApplier>,
    topology: Arc<dyn TopologySource>,
    gate: Arc<ManagementGate>,
    retry: ConflictRetry,
}

impl std::fmt::Debug for DeploymentReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentReconciler")
            .field("target", &self.target)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl DeploymentReconciler {
    #[must_use]
    pub fn new(
        target: DeploymentTarget,
        operator: Arc<dyn OperatorClient>,
        applier: Arc<dyn ResourceApplier>,
        topology: Arc<dyn TopologySource>,
        gate: Arc<ManagementGate>,
        retry: ConflictRetry,
    ) -> Self {
        let pipeline = ManifestPipeline::for_deployment(target.images.clone());
        Self {
            target,
            pipeline,
            operator,
            applier,
            topology,
            gate,
            retry,
        }
    }

    /// Render the deployment manifest for the current spec and topology
    async fn render(&self, spec: &crate::crd::OperatorSpec) -> Result<Deployment, SyncError> {
        let template = assets::read_file(self.target.asset)?;
        let topology = match self.topology.snapshot().await {
            Ok(topology) => topology,
            Err(e) if e.is_not_found() => {
                return Err(HookError::TopologyUnavailable {
                    stage: "control-plane-topology",
                }
                .into())
            }
            Err(e) => return Err(e.into()),
        };
        let manifest = self.pipeline.apply(spec, &topology, template)?;
        let deployment = serde_yaml::from_slice(&manifest).map_err(|source| HookError::Parse {
            stage: "render",
            source,
        })?;
        Ok(deployment)
    }
}

#[async_trait]
impl Reconcile for DeploymentReconciler {
    fn name(&self) -> &str {
        self.target.controller
    }

    fn watches(&self) -> &[ResourceKind] {
        &[
            ResourceKind::Deployment,
            ResourceKind::Node,
            ResourceKind::Infrastructure,
        ]
    }

    fn wants(&self, event: &ClusterEvent) -> bool {
        match event.kind {
            ResourceKind::Deployment => event.concerns(self.target.deployment),
            kind => self.watches().contains(&kind),
        }
    }

    async fn reconcile(&self, _target: &str) -> Result<(), SyncError> {
        let operator = self.operator.get_operator().await?;
        let state = operator.spec.management_state;
        if !self.gate.allows_mutation(state) {
            debug!(
                deployment = self.target.deployment,
                management_state = state.as_str(),
                "management state blocks changes, skipping"
            );
            return Ok(());
        }

        let desired = self.render(&operator.spec).await?;
        let live = self.applier.apply_deployment(&desired).await?;
        let conditions = deployment_conditions(self.target.controller, &live);
        let ready = live
            .status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0);
        info!(
            deployment = self.target.deployment,
            ready_replicas = ready,
            available = conditions[0].is_true(),
            progressing = conditions[1].is_true(),
            "deployment applied"
        );

        let now = status::now();
        let generation = operator.metadata.generation;
        let reports_ready = self.target.reports_ready_replicas;
        status::update_operator_status(self.operator.as_ref(), &self.retry, |s| {
            for condition in &conditions {
                status::set_condition(&mut s.conditions, condition.clone(), &now);
            }
            if reports_ready {
                s.ready_replicas = ready;
                s.observed_generation = generation;
            }
        })
        .await?;
        Ok(())
    }
}

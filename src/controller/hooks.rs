//! # Manifest Hooks
//!
//! Ordered, pure transforms that turn a deployment template into the manifest
//! that gets applied.
//!
//! Stages run in order, each consuming the previous stage's output:
//!
//! 1. [`PlaceholderHook`] - literal `${NAME}` substitution
//! 2. [`ControlPlaneTopologyHook`] - clears the node selector on hosted control planes
//! 3. [`ReplicasHook`] - one replica per cluster, two when more than one node can host it
//!
//! A failing stage aborts the whole pipeline; no partially transformed
//! manifest is ever returned.

use crate::constants::LOG_LEVEL_TOKEN;
use crate::controller::topology::TopologySnapshot;
use crate::crd::{OperatorSpec, TopologyMode};
use k8s_openapi::api::apps::v1::Deployment;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::trace;

/// Hook stage failures
#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook {stage}: manifest is not valid UTF-8")]
    InvalidUtf8 { stage: &'static str },
    #[error("hook {stage}: failed to parse manifest: {source}")]
    Parse {
        stage: &'static str,
        source: serde_yaml::Error,
    },
    #[error("hook {stage}: failed to serialize manifest: {source}")]
    Serialize {
        stage: &'static str,
        source: serde_yaml::Error,
    },
    #[error("hook {stage}: manifest has no {field}")]
    MissingField {
        stage: &'static str,
        field: &'static str,
    },
    #[error("hook {stage}: cluster topology is not available")]
    TopologyUnavailable { stage: &'static str },
}

/// Inputs every stage may read
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub spec: &'a OperatorSpec,
    pub topology: &'a TopologySnapshot,
}

/// One pipeline stage
///
/// Implementations must be deterministic in their inputs and free of side effects.
pub trait ManifestHook: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn apply(&self, ctx: &HookContext<'_>, manifest: Vec<u8>) -> Result<Vec<u8>, HookError>;
}

/// Replace every known token in a single left-to-right pass
///
/// Replacement text is never rescanned, and text that matches no token is
/// copied through unchanged. When two tokens match at the same position the
/// first pair wins.
pub fn substitute(template: &str, pairs: &[(String, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    'scan: while !rest.is_empty() {
        for (token, value) in pairs {
            if !token.is_empty() && rest.starts_with(token.as_str()) {
                out.push_str(value);
                rest = &rest[token.len()..];
                continue 'scan;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

/// Stage 1: literal placeholder substitution
///
/// Image tokens come from process configuration; the log-level token is the
/// verbosity ordinal of `spec.logLevel`.
#[derive(Debug, Clone)]
pub struct PlaceholderHook {
    images: Vec<(String, String)>,
}

impl PlaceholderHook {
    /// `images` maps tokens such as `${OPERAND_IMAGE}` to image references
    #[must_use]
    pub fn new(images: Vec<(String, String)>) -> Self {
        Self { images }
    }

    fn pairs(&self, spec: &OperatorSpec) -> Vec<(String, String)> {
        let mut pairs = self.images.clone();
        pairs.push((
            LOG_LEVEL_TOKEN.to_string(),
            spec.log_level.to_verbosity().to_string(),
        ));
        pairs
    }
}

impl ManifestHook for PlaceholderHook {
    fn name(&self) -> &'static str {
        "placeholders"
    }

    fn apply(&self, ctx: &HookContext<'_>, manifest: Vec<u8>) -> Result<Vec<u8>, HookError> {
        let template = String::from_utf8(manifest).map_err(|_| HookError::InvalidUtf8 {
            stage: self.name(),
        })?;
        Ok(substitute(&template, &self.pairs(ctx.spec)).into_bytes())
    }
}

fn parse_deployment(stage: &'static str, manifest: &[u8]) -> Result<Deployment, HookError> {
    serde_yaml::from_slice(manifest).map_err(|source| HookError::Parse { stage, source })
}

fn serialize_deployment(stage: &'static str, deployment: &Deployment) -> Result<Vec<u8>, HookError> {
    serde_yaml::to_string(deployment)
        .map(String::into_bytes)
        .map_err(|source| HookError::Serialize { stage, source })
}

/// Stage 2: adjust fields that depend on where the control plane runs
///
/// With an `External` control plane there are no master nodes in the cluster,
/// so the pod node selector is removed. Any other value, including one that is
/// unset or unrecognised, leaves the manifest untouched. Fails only while the
/// Infrastructure object itself is missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlPlaneTopologyHook;

impl ManifestHook for ControlPlaneTopologyHook {
    fn name(&self) -> &'static str {
        "control-plane-topology"
    }

    fn apply(&self, ctx: &HookContext<'_>, manifest: Vec<u8>) -> Result<Vec<u8>, HookError> {
        if !ctx.topology.infrastructure_present {
            return Err(HookError::TopologyUnavailable { stage: self.name() });
        }
        if ctx.topology.control_plane_topology != Some(TopologyMode::External) {
            return Ok(manifest);
        }

        let mut deployment = parse_deployment(self.name(), &manifest)?;
        let pod_spec = deployment
            .spec
            .as_mut()
            .and_then(|spec| spec.template.spec.as_mut())
            .ok_or(HookError::MissingField {
                stage: self.name(),
                field: "spec.template.spec",
            })?;
        pod_spec.node_selector = None;
        trace!("cleared node selector for external control plane");
        serialize_deployment(self.name(), &deployment)
    }
}

/// Stage 3: replica count from the nodes that can host the pods
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplicasHook;

impl ReplicasHook {
    /// Two replicas when more than one node matches, otherwise one
    #[must_use]
    pub fn replicas_for(topology: &TopologySnapshot, selector: &BTreeMap<String, String>) -> i32 {
        if topology.nodes_matching(selector).nth(1).is_some() {
            2
        } else {
            1
        }
    }
}

impl ManifestHook for ReplicasHook {
    fn name(&self) -> &'static str {
        "replicas"
    }

    fn apply(&self, ctx: &HookContext<'_>, manifest: Vec<u8>) -> Result<Vec<u8>, HookError> {
        let mut deployment = parse_deployment(self.name(), &manifest)?;
        let spec = deployment.spec.as_mut().ok_or(HookError::MissingField {
            stage: self.name(),
            field: "spec",
        })?;
        let selector = spec
            .template
            .spec
            .as_ref()
            .and_then(|pod| pod.node_selector.clone())
            .unwrap_or_default();
        spec.replicas = Some(Self::replicas_for(ctx.topology, &selector));
        serialize_deployment(self.name(), &deployment)
    }
}

/// Ordered list of hooks
#[derive(Debug, Default)]
pub struct ManifestPipeline {
    hooks: Vec<Box<dyn ManifestHook>>,
}

impl ManifestPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Placeholder substitution, control-plane topology and replica count, in that order
    #[must_use]
    pub fn for_deployment(images: Vec<(String, String)>) -> Self {
        Self::new()
            .with_hook(PlaceholderHook::new(images))
            .with_hook(ControlPlaneTopologyHook)
            .with_hook(ReplicasHook)
    }

    #[must_use]
    pub fn with_hook(mut self, hook: impl ManifestHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Names of the stages, in order
    pub fn stages(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.hooks.iter().map(|hook| hook.name())
    }

    /// Run every stage over `template`
    pub fn apply(
        &self,
        spec: &OperatorSpec,
        topology: &TopologySnapshot,
        template: &[u8],
    ) -> Result<Vec<u8>, HookError> {
        let ctx = HookContext { spec, topology };
        self.hooks
            .iter()
            .try_fold(template.to_vec(), |manifest, hook| hook.apply(&ctx, manifest))
    }
}

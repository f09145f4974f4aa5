//! # Kube Client
//!
//! [`kube`] implementation of the client traits.
//!
//! Objects are applied with server-side apply under one field manager. Status
//! writes are merge patches that carry `metadata.resourceVersion`, which the
//! API server treats as a precondition and answers with 409 when stale.

use super::{
    ClientError, ClusterOperatorClient, OperatorClient, ResourceApplier, TopologySource,
};
use crate::constants::{FIELD_MANAGER, INFRASTRUCTURE_NAME, OPERATOR_CR_NAME};
use crate::controller::topology::{NodeInfo, TopologySnapshot};
use crate::crd::{CSISnapshotController, ClusterOperator, Infrastructure, OperatorStatus};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Node;
use kube::{
    api::{Api, ApiResource, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    core::{DynamicObject, GroupVersionKind},
    Client,
};
use tracing::debug;

/// Cluster client backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

impl std::fmt::Debug for KubeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClient").finish_non_exhaustive()
    }
}

impl KubeClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Underlying client, used by the watch streams
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    fn dynamic_api(&self, object: &DynamicObject) -> Result<(Api<DynamicObject>, String), ClientError> {
        let types = object
            .types
            .as_ref()
            .ok_or_else(|| ClientError::InvalidManifest("object has no apiVersion/kind".to_string()))?;
        let name = object
            .metadata
            .name
            .clone()
            .ok_or_else(|| ClientError::InvalidManifest("object has no metadata.name".to_string()))?;

        let (group, version) = match types.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", types.api_version.as_str()),
        };
        let gvk = GroupVersionKind::gvk(group, version, &types.kind);
        let ar = ApiResource::from_gvk(&gvk);

        let api = match object.metadata.namespace.as_deref() {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        };
        Ok((api, name))
    }
}

/// Patch parameters for status writes
///
/// Merge patches cannot be forced; only the field manager is recorded.
fn status_patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..PatchParams::default()
    }
}

#[async_trait]
impl OperatorClient for KubeClient {
    async fn get_operator(&self) -> Result<CSISnapshotController, ClientError> {
        let api: Api<CSISnapshotController> = Api::all(self.client.clone());
        api.get(OPERATOR_CR_NAME)
            .await
            .map_err(|e| ClientError::from_kube("CSISnapshotController", OPERATOR_CR_NAME, e))
    }

    async fn update_operator_status(
        &self,
        resource_version: &str,
        status: &OperatorStatus,
    ) -> Result<CSISnapshotController, ClientError> {
        let api: Api<CSISnapshotController> = Api::all(self.client.clone());
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": resource_version },
            "status": status,
        });
        api.patch_status(OPERATOR_CR_NAME, &status_patch_params(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ClientError::from_kube("CSISnapshotController", OPERATOR_CR_NAME, e))
    }
}

#[async_trait]
impl ClusterOperatorClient for KubeClient {
    async fn get_cluster_operator(
        &self,
        name: &str,
    ) -> Result<Option<ClusterOperator>, ClientError> {
        let api: Api<ClusterOperator> = Api::all(self.client.clone());
        api.get_opt(name)
            .await
            .map_err(|e| ClientError::from_kube("ClusterOperator", name, e))
    }

    async fn create_cluster_operator(
        &self,
        cluster_operator: &ClusterOperator,
    ) -> Result<ClusterOperator, ClientError> {
        let api: Api<ClusterOperator> = Api::all(self.client.clone());
        let name = cluster_operator.metadata.name.clone().unwrap_or_default();
        api.create(&PostParams::default(), cluster_operator)
            .await
            .map_err(|e| ClientError::from_kube("ClusterOperator", &name, e))
    }

    async fn update_cluster_operator_status(
        &self,
        cluster_operator: &ClusterOperator,
    ) -> Result<ClusterOperator, ClientError> {
        let api: Api<ClusterOperator> = Api::all(self.client.clone());
        let name = cluster_operator
            .metadata
            .name
            .clone()
            .ok_or_else(|| ClientError::InvalidManifest("ClusterOperator has no name".to_string()))?;
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": cluster_operator.metadata.resource_version },
            "status": cluster_operator.status,
        });
        api.patch_status(&name, &status_patch_params(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ClientError::from_kube("ClusterOperator", &name, e))
    }
}

#[async_trait]
impl ResourceApplier for KubeClient {
    async fn apply_object(&self, object: &DynamicObject) -> Result<(), ClientError> {
        let (api, name) = self.dynamic_api(object)?;
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&name, &params, &Patch::Apply(object))
            .await
            .map_err(|e| ClientError::from_kube("object", &name, e))?;
        debug!(name = %name, "applied object");
        Ok(())
    }

    async fn delete_object(&self, object: &DynamicObject) -> Result<(), ClientError> {
        let (api, name) = self.dynamic_api(object)?;
        api.delete(&name, &DeleteParams::default())
            .await
            .map_err(|e| ClientError::from_kube("object", &name, e))?;
        debug!(name = %name, "deleted object");
        Ok(())
    }

    async fn apply_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClientError> {
        let name = deployment
            .metadata
            .name
            .clone()
            .ok_or_else(|| ClientError::InvalidManifest("deployment has no name".to_string()))?;
        let namespace = deployment
            .metadata
            .namespace
            .clone()
            .ok_or_else(|| ClientError::InvalidManifest(format!("deployment {name} has no namespace")))?;
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&name, &params, &Patch::Apply(deployment))
            .await
            .map_err(|e| ClientError::from_kube("Deployment", &name, e))
    }
}

#[async_trait]
impl TopologySource for KubeClient {
    async fn snapshot(&self) -> Result<TopologySnapshot, ClientError> {
        let infrastructures: Api<Infrastructure> = Api::all(self.client.clone());
        let infrastructure = infrastructures
            .get_opt(INFRASTRUCTURE_NAME)
            .await
            .map_err(|e| ClientError::from_kube("Infrastructure", INFRASTRUCTURE_NAME, e))?;
        let status = infrastructure.map(|i| i.status.unwrap_or_default());

        let nodes: Api<Node> = Api::all(self.client.clone());
        let nodes = nodes
            .list(&ListParams::default())
            .await
            .map_err(|e| ClientError::from_kube("Node", "*", e))?
            .items
            .into_iter()
            .map(|node| NodeInfo {
                name: node.metadata.name.unwrap_or_default(),
                labels: node.metadata.labels.unwrap_or_default(),
            })
            .collect();

        Ok(TopologySnapshot::observed(status.as_ref(), nodes))
    }
}

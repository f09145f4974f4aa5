//! # Cluster Client
//!
//! Trait seams over the cluster API.
//!
//! Control loops only talk to the cluster through these traits. The `kube`
//! implementation lives in `kube_client.rs`; tests use the in-memory fakes in
//! `fake.rs`.
//!
//! Status writes carry the resource version that was read. A write against a
//! stale version fails with [`ClientError::Conflict`] and the caller retries
//! the whole read-merge-write cycle.

#[cfg(test)]
pub mod fake;
pub mod kube_client;

use crate::controller::topology::TopologySnapshot;
use crate::crd::{CSISnapshotController, ClusterOperator, OperatorStatus};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::core::DynamicObject;
use thiserror::Error;

pub use kube_client::KubeClient;

/// Cluster API errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Write rejected because the object changed since it was read
    #[error("conflict writing {kind} {name}: object was modified")]
    Conflict { kind: &'static str, name: String },
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
}

impl ClientError {
    /// Map a kube error, turning 404 and 409 responses into typed variants
    pub fn from_kube(kind: &'static str, name: &str, error: kube::Error) -> Self {
        match error {
            kube::Error::Api(ref response) if response.code == 409 => ClientError::Conflict {
                kind,
                name: name.to_string(),
            },
            kube::Error::Api(ref response) if response.code == 404 => ClientError::NotFound {
                kind,
                name: name.to_string(),
            },
            other => ClientError::Kube(other),
        }
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Conflict { .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    /// Whether a retry may succeed without any change on our side
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Conflict { .. } | ClientError::NotFound { .. } => true,
            ClientError::Kube(kube::Error::Api(response)) => {
                response.code == 429 || response.code >= 500
            }
            ClientError::Kube(_) => true,
            ClientError::Serialization(_) | ClientError::InvalidManifest(_) => false,
        }
    }
}

/// Access to the operator resource
#[async_trait]
pub trait OperatorClient: Send + Sync {
    /// Read the operator resource
    async fn get_operator(&self) -> Result<CSISnapshotController, ClientError>;

    /// Replace the operator status, guarded by the resource version that was read
    async fn update_operator_status(
        &self,
        resource_version: &str,
        status: &OperatorStatus,
    ) -> Result<CSISnapshotController, ClientError>;
}

/// Access to the ClusterOperator status object
#[async_trait]
pub trait ClusterOperatorClient: Send + Sync {
    /// Read a ClusterOperator, `None` if it does not exist
    async fn get_cluster_operator(&self, name: &str)
        -> Result<Option<ClusterOperator>, ClientError>;

    async fn create_cluster_operator(
        &self,
        cluster_operator: &ClusterOperator,
    ) -> Result<ClusterOperator, ClientError>;

    /// Replace the status, guarded by `metadata.resourceVersion` of the argument
    async fn update_cluster_operator_status(
        &self,
        cluster_operator: &ClusterOperator,
    ) -> Result<ClusterOperator, ClientError>;
}

/// Applies and removes managed objects
#[async_trait]
pub trait ResourceApplier: Send + Sync {
    /// Create or update an arbitrary object
    async fn apply_object(&self, object: &DynamicObject) -> Result<(), ClientError>;

    /// Delete an arbitrary object
    async fn delete_object(&self, object: &DynamicObject) -> Result<(), ClientError>;

    /// Create or update a deployment, returning the live object
    async fn apply_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClientError>;
}

/// Source of cluster topology
#[async_trait]
pub trait TopologySource: Send + Sync {
    /// Read the current topology in one pass
    async fn snapshot(&self) -> Result<TopologySnapshot, ClientError>;
}

/// Parse a YAML manifest into a dynamic object
pub fn parse_manifest(manifest: &[u8]) -> Result<DynamicObject, ClientError> {
    let object: DynamicObject = serde_yaml::from_slice(manifest)
        .map_err(|e| ClientError::InvalidManifest(e.to_string()))?;
    if object.types.is_none() {
        return Err(ClientError::InvalidManifest(
            "manifest has no apiVersion/kind".to_string(),
        ));
    }
    if object.metadata.name.is_none() {
        return Err(ClientError::InvalidManifest(
            "manifest has no metadata.name".to_string(),
        ));
    }
    Ok(object)
}

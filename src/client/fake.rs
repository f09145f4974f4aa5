//! In-memory cluster used by unit tests.
//!
//! Resource versions are checked on every status write, so tests exercise the
//! same conflict paths the API server would.

use super::{
    ClientError, ClusterOperatorClient, OperatorClient, ResourceApplier, TopologySource,
};
use crate::constants::OPERATOR_CR_NAME;
use crate::controller::topology::TopologySnapshot;
use crate::crd::{CSISnapshotController, ClusterOperator, OperatorSpec, OperatorStatus};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use kube::core::DynamicObject;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type ClusterOperatorMutation = Box<dyn Fn(&mut ClusterOperator) + Send + Sync>;

/// Kubernetes client whose every request fails
///
/// Enough to build controllers and their watches without a cluster.
#[cfg(test)]
#[must_use]
pub fn offline_client() -> kube::Client {
    let service = tower::service_fn(|_request: axum::http::Request<kube::client::Body>| async {
        Err::<axum::http::Response<kube::client::Body>, std::io::Error>(std::io::Error::other(
            "no cluster in tests",
        ))
    });
    kube::Client::new(service, "default")
}

/// In-memory stand-in for the cluster
pub struct FakeCluster {
    operator: Mutex<CSISnapshotController>,
    cluster_operators: Mutex<BTreeMap<String, ClusterOperator>>,
    objects: Mutex<BTreeMap<String, DynamicObject>>,
    deleted: Mutex<Vec<String>>,
    deployments: Mutex<BTreeMap<String, Deployment>>,
    deployment_status: Mutex<BTreeMap<String, DeploymentStatus>>,
    topology: Mutex<Option<TopologySnapshot>>,
    cluster_operator_conflicts: Mutex<Vec<ClusterOperatorMutation>>,
    operator_status_writes: AtomicUsize,
    cluster_operator_status_writes: AtomicUsize,
}

impl std::fmt::Debug for FakeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeCluster").finish_non_exhaustive()
    }
}

fn key(object: &DynamicObject) -> String {
    let kind = object
        .types
        .as_ref()
        .map(|t| t.kind.clone())
        .unwrap_or_default();
    format!(
        "{kind}/{}",
        object.metadata.name.as_deref().unwrap_or_default()
    )
}

fn bump(resource_version: &mut Option<String>) {
    let next = resource_version
        .as_deref()
        .and_then(|rv| rv.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    *resource_version = Some(next.to_string());
}

impl FakeCluster {
    pub fn new(spec: OperatorSpec) -> Self {
        let mut operator = CSISnapshotController::new(OPERATOR_CR_NAME, spec);
        operator.metadata.resource_version = Some("1".to_string());
        operator.metadata.generation = Some(1);
        Self {
            operator: Mutex::new(operator),
            cluster_operators: Mutex::new(BTreeMap::new()),
            objects: Mutex::new(BTreeMap::new()),
            deleted: Mutex::new(Vec::new()),
            deployments: Mutex::new(BTreeMap::new()),
            deployment_status: Mutex::new(BTreeMap::new()),
            topology: Mutex::new(Some(TopologySnapshot::default())),
            cluster_operator_conflicts: Mutex::new(Vec::new()),
            operator_status_writes: AtomicUsize::new(0),
            cluster_operator_status_writes: AtomicUsize::new(0),
        }
    }

    pub fn set_topology(&self, topology: Option<TopologySnapshot>) {
        *self.topology.lock().unwrap() = topology;
    }

    pub fn set_spec(&self, spec: OperatorSpec) {
        let mut operator = self.operator.lock().unwrap();
        operator.spec = spec;
        bump(&mut operator.metadata.resource_version);
    }

    /// Status the fake reports back for a deployment after it is applied
    pub fn set_deployment_status(&self, name: &str, status: DeploymentStatus) {
        self.deployment_status
            .lock()
            .unwrap()
            .insert(name.to_string(), status);
    }

    /// Overwrite the operator status as a concurrent writer would
    pub fn write_operator_status_externally(&self, mutate: impl FnOnce(&mut OperatorStatus)) {
        let mut operator = self.operator.lock().unwrap();
        let mut status = operator.status.clone().unwrap_or_default();
        mutate(&mut status);
        operator.status = Some(status);
        bump(&mut operator.metadata.resource_version);
    }

    /// Make the next ClusterOperator status writes fail with a conflict
    ///
    /// Each queued mutation is applied to the stored object first, standing in
    /// for the concurrent writer that won the race.
    pub fn inject_cluster_operator_conflict(
        &self,
        mutation: impl Fn(&mut ClusterOperator) + Send + Sync + 'static,
    ) {
        self.cluster_operator_conflicts
            .lock()
            .unwrap()
            .push(Box::new(mutation));
    }

    pub fn insert_cluster_operator(&self, mut cluster_operator: ClusterOperator) {
        bump(&mut cluster_operator.metadata.resource_version);
        let name = cluster_operator.metadata.name.clone().unwrap_or_default();
        self.cluster_operators
            .lock()
            .unwrap()
            .insert(name, cluster_operator);
    }

    pub fn operator(&self) -> CSISnapshotController {
        self.operator.lock().unwrap().clone()
    }

    pub fn operator_status(&self) -> OperatorStatus {
        self.operator().status.unwrap_or_default()
    }

    pub fn cluster_operator(&self, name: &str) -> Option<ClusterOperator> {
        self.cluster_operators.lock().unwrap().get(name).cloned()
    }

    pub fn object_names(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn deployment(&self, name: &str) -> Option<Deployment> {
        self.deployments.lock().unwrap().get(name).cloned()
    }

    pub fn operator_status_writes(&self) -> usize {
        self.operator_status_writes.load(Ordering::SeqCst)
    }

    pub fn cluster_operator_status_writes(&self) -> usize {
        self.cluster_operator_status_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OperatorClient for FakeCluster {
    async fn get_operator(&self) -> Result<CSISnapshotController, ClientError> {
        Ok(self.operator())
    }

    async fn update_operator_status(
        &self,
        resource_version: &str,
        status: &OperatorStatus,
    ) -> Result<CSISnapshotController, ClientError> {
        // Let racing writers interleave between read and write
        tokio::task::yield_now().await;
        let mut operator = self.operator.lock().unwrap();
        if operator.metadata.resource_version.as_deref() != Some(resource_version) {
            return Err(ClientError::Conflict {
                kind: "CSISnapshotController",
                name: OPERATOR_CR_NAME.to_string(),
            });
        }
        operator.status = Some(status.clone());
        bump(&mut operator.metadata.resource_version);
        self.operator_status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(operator.clone())
    }
}

#[async_trait]
impl ClusterOperatorClient for FakeCluster {
    async fn get_cluster_operator(
        &self,
        name: &str,
    ) -> Result<Option<ClusterOperator>, ClientError> {
        Ok(self.cluster_operator(name))
    }

    async fn create_cluster_operator(
        &self,
        cluster_operator: &ClusterOperator,
    ) -> Result<ClusterOperator, ClientError> {
        let name = cluster_operator.metadata.name.clone().unwrap_or_default();
        let mut cluster_operators = self.cluster_operators.lock().unwrap();
        if cluster_operators.contains_key(&name) {
            return Err(ClientError::Conflict {
                kind: "ClusterOperator",
                name,
            });
        }
        let mut created = cluster_operator.clone();
        created.metadata.resource_version = Some("1".to_string());
        cluster_operators.insert(name, created.clone());
        Ok(created)
    }

    async fn update_cluster_operator_status(
        &self,
        cluster_operator: &ClusterOperator,
    ) -> Result<ClusterOperator, ClientError> {
        let name = cluster_operator.metadata.name.clone().unwrap_or_default();
        let mut cluster_operators = self.cluster_operators.lock().unwrap();
        let stored = cluster_operators
            .get_mut(&name)
            .ok_or_else(|| ClientError::NotFound {
                kind: "ClusterOperator",
                name: name.clone(),
            })?;

        let mut conflicts = self.cluster_operator_conflicts.lock().unwrap();
        if !conflicts.is_empty() {
            let mutation = conflicts.remove(0);
            mutation(stored);
            bump(&mut stored.metadata.resource_version);
            return Err(ClientError::Conflict {
                kind: "ClusterOperator",
                name,
            });
        }

        if stored.metadata.resource_version != cluster_operator.metadata.resource_version {
            return Err(ClientError::Conflict {
                kind: "ClusterOperator",
                name,
            });
        }
        stored.status = cluster_operator.status.clone();
        bump(&mut stored.metadata.resource_version);
        self.cluster_operator_status_writes
            .fetch_add(1, Ordering::SeqCst);
        Ok(stored.clone())
    }
}

#[async_trait]
impl ResourceApplier for FakeCluster {
    async fn apply_object(&self, object: &DynamicObject) -> Result<(), ClientError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key(object), object.clone());
        Ok(())
    }

    async fn delete_object(&self, object: &DynamicObject) -> Result<(), ClientError> {
        let key = key(object);
        let removed = self.objects.lock().unwrap().remove(&key);
        if removed.is_none() {
            return Err(ClientError::NotFound {
                kind: "object",
                name: key,
            });
        }
        self.deleted.lock().unwrap().push(key);
        Ok(())
    }

    async fn apply_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClientError> {
        let name = deployment.metadata.name.clone().unwrap_or_default();
        let mut live = deployment.clone();
        live.metadata.generation = Some(1);
        live.status = self.deployment_status.lock().unwrap().get(&name).cloned();
        self.deployments
            .lock()
            .unwrap()
            .insert(name, live.clone());
        Ok(live)
    }
}

#[async_trait]
impl TopologySource for FakeCluster {
    async fn snapshot(&self) -> Result<TopologySnapshot, ClientError> {
        self.topology
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ClientError::NotFound {
                kind: "Infrastructure",
                name: "cluster".to_string(),
            })
    }
}

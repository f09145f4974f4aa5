//! # Initialization
//!
//! Operator startup: rustls setup, configuration, tracing, metrics, server
//! startup, Kubernetes client setup and controller wiring.
//!
//! Any failure here is fatal and keeps the process from entering its run loop.

use crate::client::{
    ClusterOperatorClient, KubeClient, OperatorClient, ResourceApplier, TopologySource,
};
use crate::config::OperatorConfig;
use crate::controller::base::{BaseController, DegradedReporter, DriverSettings};
use crate::controller::cluster_operator::ClusterOperatorReconciler;
use crate::controller::condition::{static_conditions, ConditionReconciler};
use crate::controller::deployment::{DeploymentReconciler, DeploymentTarget};
use crate::controller::loglevel::{LogLevelReconciler, VerbositySink};
use crate::controller::management::{ManagementGate, ManagementStateReconciler};
use crate::controller::resources::ResourceSelector;
use crate::controller::static_resources::StaticResourcesReconciler;
use crate::controller::status::ConflictRetry;
use crate::controller::supervisor::{Supervisor, SupervisorError};
use crate::controller::version::{VersionGetter, VersionReconciler};
use crate::crd::LogLevel;
use crate::observability::{self, LogFormat};
use crate::server::{start_server, ServerState};
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Process-level options from the command line
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    pub metrics_port: u16,
    pub log_format: LogFormat,
}

/// Client trait objects shared by every controller
#[derive(Clone)]
pub struct Clients {
    pub operator: Arc<dyn OperatorClient>,
    pub cluster_operators: Arc<dyn ClusterOperatorClient>,
    pub applier: Arc<dyn ResourceApplier>,
    pub topology: Arc<dyn TopologySource>,
}

impl std::fmt::Debug for Clients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clients").finish_non_exhaustive()
    }
}

impl Clients {
    /// Every seam backed by the same Kubernetes client
    #[must_use]
    pub fn from_kube(client: KubeClient) -> Self {
        let client = Arc::new(client);
        Self {
            operator: Arc::clone(&client) as Arc<dyn OperatorClient>,
            cluster_operators: Arc::clone(&client) as Arc<dyn ClusterOperatorClient>,
            applier: Arc::clone(&client) as Arc<dyn ResourceApplier>,
            topology: client as Arc<dyn TopologySource>,
        }
    }
}

/// Build every controller and register it with a supervisor
#[must_use]
pub fn build_supervisor(
    client: &Client,
    clients: &Clients,
    config: &OperatorConfig,
    gate: &Arc<ManagementGate>,
    verbosity: Arc<dyn VerbositySink>,
) -> Supervisor {
    let retry = ConflictRetry::from_config(config);
    let settings = DriverSettings::from_config(config);
    let reporter = DegradedReporter::new(Arc::clone(&clients.operator), retry.clone());
    let getter = Arc::new(VersionGetter::new());

    let operand = DeploymentTarget::operand(config);
    let webhook = DeploymentTarget::webhook(config);
    let deployment_controllers = vec![operand.controller, webhook.controller];

    let deployment = |target: DeploymentTarget| {
        Arc::new(BaseController::reporting(
            DeploymentReconciler::new(
                target,
                Arc::clone(&clients.operator),
                Arc::clone(&clients.applier),
                Arc::clone(&clients.topology),
                Arc::clone(gate),
                retry.clone(),
            ),
            client.clone(),
            &settings,
            reporter.clone(),
        ))
    };

    Supervisor::new(config.workers, config.shutdown_grace())
        .with_controller(deployment(operand))
        .with_controller(deployment(webhook))
        .with_controller(Arc::new(BaseController::reporting(
            StaticResourcesReconciler::new(
                ResourceSelector::standard(),
                Arc::clone(&clients.operator),
                Arc::clone(&clients.applier),
                Arc::clone(&clients.topology),
                Arc::clone(gate),
            ),
            client.clone(),
            &settings,
            reporter.clone(),
        )))
        .with_controller(Arc::new(BaseController::new(
            VersionReconciler::new(
                Arc::clone(&clients.operator),
                Arc::clone(&getter),
                Arc::clone(gate),
                deployment_controllers.clone(),
                config.operator_version.clone(),
                config.operand_version.clone(),
            ),
            client.clone(),
            &settings,
        )))
        .with_controller(Arc::new(BaseController::new(
            ClusterOperatorReconciler::new(
                Arc::clone(&clients.operator),
                Arc::clone(&clients.cluster_operators),
                Arc::clone(&getter),
                deployment_controllers,
                config,
                retry.clone(),
            ),
            client.clone(),
            &settings,
        )
        .with_version_trigger(getter)))
        .with_controller(Arc::new(BaseController::new(
            ConditionReconciler::new(
                Arc::clone(&clients.operator),
                Arc::clone(gate),
                static_conditions(),
                retry.clone(),
            ),
            client.clone(),
            &settings,
        )))
        .with_controller(Arc::new(BaseController::new(
            ManagementStateReconciler::new(
                Arc::clone(&clients.operator),
                Arc::clone(gate),
                retry.clone(),
            ),
            client.clone(),
            &settings,
        )))
        .with_controller(Arc::new(BaseController::new(
            LogLevelReconciler::new(Arc::clone(&clients.operator), verbosity),
            client.clone(),
            &settings,
        )))
}

/// Everything needed to run the operator
pub struct Initialized {
    pub config: Arc<OperatorConfig>,
    pub server_state: Arc<ServerState>,
    supervisor: Supervisor,
    server: JoinHandle<()>,
}

impl std::fmt::Debug for Initialized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Initialized")
            .field("supervisor", &self.supervisor)
            .field("server_ready", &self.server_state.ready())
            .finish_non_exhaustive()
    }
}

/// Initialize the operator runtime
///
/// `cancel` is the shared shutdown signal; the HTTP server is tied to it.
pub async fn initialize(options: RuntimeOptions, cancel: &CancellationToken) -> Result<Initialized> {
    // Required for rustls 0.23+ when no default provider is set via features
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    let config = Arc::new(OperatorConfig::from_env().context("Failed to load operator configuration")?);

    let logging = Arc::new(
        observability::init_logging(options.log_format, LogLevel::Normal)
            .context("Failed to initialize logging")?,
    );

    info!(
        version = %config.operator_version,
        operand_version = %config.operand_version,
        build_git_hash = env!("BUILD_GIT_HASH"),
        build_datetime = env!("BUILD_DATETIME"),
        "starting CSI snapshot controller operator"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server = {
        let state = Arc::clone(&server_state);
        let cancel = cancel.clone();
        let port = options.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_server(port, state, cancel).await {
                error!(error = %e, "HTTP server error");
            }
        })
    };

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let gate = Arc::new(ManagementGate::new());
    gate.set_not_removable()
        .context("Failed to set management policy")?;

    let clients = Clients::from_kube(KubeClient::new(client.clone()));
    let supervisor = build_supervisor(&client, &clients, &config, &gate, logging);
    info!(
        controllers = ?supervisor.names().collect::<Vec<_>>(),
        workers = config.workers,
        "operator initialized"
    );

    Ok(Initialized {
        config,
        server_state,
        supervisor,
        server,
    })
}

impl Initialized {
    /// Run every controller until `cancel` fires
    ///
    /// Always ends with [`SupervisorError::Stopped`].
    pub async fn run(self, cancel: CancellationToken) -> Result<(), SupervisorError> {
        let Self {
            server_state,
            supervisor,
            server,
            ..
        } = self;

        server_state.mark_ready();
        {
            let server_state = Arc::clone(&server_state);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                server_state.mark_not_ready();
                info!("marked server as not ready");
            });
        }

        let result = supervisor.run(cancel).await;

        if let Err(e) = server.await {
            error!(error = %e, "HTTP server task failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::{offline_client, FakeCluster};
    use crate::controller::loglevel::LogLevelError;
    use crate::crd::OperatorSpec;

    struct Silent;

    impl VerbositySink for Silent {
        fn current(&self) -> LogLevel {
            LogLevel::Normal
        }

        fn set(&self, _level: LogLevel) -> Result<(), LogLevelError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_every_controller_is_registered() {
        let cluster = Arc::new(FakeCluster::new(OperatorSpec::default()));
        let clients = Clients {
            operator: Arc::clone(&cluster) as Arc<dyn OperatorClient>,
            cluster_operators: Arc::clone(&cluster) as Arc<dyn ClusterOperatorClient>,
            applier: Arc::clone(&cluster) as Arc<dyn ResourceApplier>,
            topology: cluster as Arc<dyn TopologySource>,
        };
        let config = OperatorConfig::from_lookup(|key| match key {
            "OPERATOR_IMAGE_VERSION" | "OPERAND_IMAGE_VERSION" => Some("1.0.0".to_string()),
            "OPERAND_IMAGE" | "WEBHOOK_IMAGE" => Some("image".to_string()),
            _ => None,
        })
        .unwrap();

        let supervisor = build_supervisor(
            &offline_client(),
            &clients,
            &config,
            &Arc::new(ManagementGate::new()),
            Arc::new(Silent),
        );
        let names: Vec<&str> = supervisor.names().collect();
        assert_eq!(
            names,
            vec![
                "CSISnapshotController",
                "CSISnapshotWebhookController",
                "StaticResourcesController",
                "VersionController",
                "ClusterOperatorStatusController",
                "ConditionController",
                "ManagementStateController",
                "LoggingController",
            ]
        );
    }
}

//! # CSI Snapshot Controller Operator
//!
//! Deploys the CSI snapshot controller and its admission webhook on the
//! cluster and reports their health on the `csi-snapshot-controller`
//! ClusterOperator.
//!
//! ## Overview
//!
//! 1. **Deployments** - Renders the operand and webhook deployments through the manifest hook pipeline
//! 2. **Static resources** - Applies CRDs, RBAC and webhook configuration, plus topology-dependent sets
//! 3. **Status** - Aggregates every loop's conditions and rolled-out versions onto the ClusterOperator
//! 4. **Management state** - Leaves the operand alone while the operator is `Unmanaged` or `Removed`
//!
//! Configuration comes from the environment (see `OperatorConfig`); the only
//! command-line options are the metrics port and log format.

use anyhow::Result;
use clap::Parser;
use csi_snapshot_controller_operator::constants::DEFAULT_METRICS_PORT;
use csi_snapshot_controller_operator::controller::supervisor::SupervisorError;
use csi_snapshot_controller_operator::observability::LogFormat;
use csi_snapshot_controller_operator::runtime::initialization::{initialize, RuntimeOptions};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// CSI snapshot controller operator
#[derive(Debug, Parser)]
#[command(name = "csi-snapshot-controller-operator", version, about)]
struct Args {
    /// Port for the metrics and probe endpoints
    #[arg(long, env = "METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    metrics_port: u16,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cancel = CancellationToken::new();

    let initialized = initialize(
        RuntimeOptions {
            metrics_port: args.metrics_port,
            log_format: args.log_format,
        },
        &cancel,
    )
    .await?;

    tokio::spawn(shutdown_on_signal(cancel.clone()));

    match initialized.run(cancel).await {
        Err(SupervisorError::Stopped) | Ok(()) => {
            info!("operator stopped");
            Ok(())
        }
    }
}

/// Cancel `cancel` on SIGINT or SIGTERM
async fn shutdown_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                wait_for_ctrl_c().await;
                cancel.cancel();
                return;
            }
        };
        tokio::select! {
            () = wait_for_ctrl_c() => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
    }
    #[cfg(not(unix))]
    {
        wait_for_ctrl_c().await;
        info!("received Ctrl-C, shutting down");
    }
    cancel.cancel();
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

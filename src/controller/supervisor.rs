//! # Supervisor
//!
//! Starts every controller against one cancellation token and blocks until
//! the token fires.
//!
//! Each controller is a [`Runnable`] and is started uniformly as its own
//! task. On cancellation controllers stop taking new work; the supervisor
//! waits up to a grace period for in-flight reconciles and then returns
//! [`SupervisorError::Stopped`]. That error is the normal way out of the run
//! loop; the process treats it as a clean shutdown.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Terminal outcome of the supervisor
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("stopped")]
    Stopped,
}

/// A controller that can be started by the supervisor
#[async_trait]
pub trait Runnable: Send + Sync {
    fn name(&self) -> &str;

    /// Run until `cancel` fires, processing with `workers` concurrent workers
    async fn run(&self, cancel: CancellationToken, workers: usize);
}

/// Owns the lifecycle of all controllers
pub struct Supervisor {
    controllers: Vec<Arc<dyn Runnable>>,
    workers: usize,
    grace: Duration,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field(
                "controllers",
                &self.controllers.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("workers", &self.workers)
            .field("grace", &self.grace)
            .finish()
    }
}

impl Supervisor {
    #[must_use]
    pub fn new(workers: usize, grace: Duration) -> Self {
        Self {
            controllers: Vec::new(),
            workers: workers.max(1),
            grace,
        }
    }

    #[must_use]
    pub fn with_controller(mut self, controller: Arc<dyn Runnable>) -> Self {
        self.controllers.push(controller);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.controllers.iter().map(|c| c.name())
    }

    /// Start every controller and block until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> Result<(), SupervisorError> {
        let mut tasks = JoinSet::new();
        for controller in self.controllers {
            let cancel = cancel.child_token();
            let workers = self.workers;
            info!(controller = controller.name(), "starting controller");
            tasks.spawn(async move {
                controller.run(cancel, workers).await;
            });
        }

        cancel.cancelled().await;
        info!("shutdown requested, waiting for controllers to stop");

        let drain = async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "controller task ended abnormally");
                }
            }
        };
        if tokio::time::timeout(self.grace, drain).await.is_err() {
            warn!(
                grace_secs = self.grace.as_secs(),
                "controllers did not stop within the grace period, abandoning in-flight work"
            );
            tasks.abort_all();
        }

        Err(SupervisorError::Stopped)
    }
}

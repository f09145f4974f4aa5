//! # Operator Log Level
//!
//! Applies `spec.operatorLogLevel` to the running process.

use crate::client::OperatorClient;
use crate::controller::base::{Reconcile, SyncError};
use crate::controller::events::ResourceKind;
use crate::crd::LogLevel;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum LogLevelError {
    #[error("failed to reload log filter: {0}")]
    Reload(String),
}

/// Somewhere the operator's own verbosity can be changed
pub trait VerbositySink: Send + Sync {
    fn current(&self) -> LogLevel;

    fn set(&self, level: LogLevel) -> Result<(), LogLevelError>;
}

/// Keeps the process log filter in line with the operator resource
pub struct LogLevelReconciler {
    client: Arc<dyn OperatorClient>,
    sink: Arc<dyn VerbositySink>,
}

impl LogLevelReconciler {
    #[must_use]
    pub fn new(client: Arc<dyn OperatorClient>, sink: Arc<dyn VerbositySink>) -> Self {
        Self { client, sink }
    }
}

#[async_trait]
impl Reconcile for LogLevelReconciler {
    fn name(&self) -> &str {
        "LoggingController"
    }

    fn watches(&self) -> &[ResourceKind] {
        &[]
    }

    async fn reconcile(&self, _target: &str) -> Result<(), SyncError> {
        let desired = self.client.get_operator().await?.spec.operator_log_level;
        let current = self.sink.current();
        if desired == current {
            return Ok(());
        }
        self.sink.set(desired)?;
        info!(
            from = ?current,
            to = ?desired,
            "operator log level changed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::OPERATOR_CR_NAME;
    use crate::client::fake::FakeCluster;
    use crate::crd::OperatorSpec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        level: Mutex<LogLevel>,
        sets: Mutex<Vec<LogLevel>>,
    }

    impl VerbositySink for RecordingSink {
        fn current(&self) -> LogLevel {
            *self.level.lock().unwrap()
        }

        fn set(&self, level: LogLevel) -> Result<(), LogLevelError> {
            *self.level.lock().unwrap() = level;
            self.sets.lock().unwrap().push(level);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_level_applied_only_on_change() {
        let cluster = Arc::new(FakeCluster::new(OperatorSpec {
            operator_log_level: LogLevel::Trace,
            ..OperatorSpec::default()
        }));
        let sink = Arc::new(RecordingSink::default());
        let reconciler = LogLevelReconciler::new(
            Arc::clone(&cluster) as Arc<dyn OperatorClient>,
            Arc::clone(&sink) as Arc<dyn VerbositySink>,
        );

        reconciler.reconcile(OPERATOR_CR_NAME).await.unwrap();
        reconciler.reconcile(OPERATOR_CR_NAME).await.unwrap();
        assert_eq!(*sink.sets.lock().unwrap(), vec![LogLevel::Trace]);

        cluster.set_spec(OperatorSpec::default());
        reconciler.reconcile(OPERATOR_CR_NAME).await.unwrap();
        assert_eq!(sink.current(), LogLevel::Normal);
    }
}

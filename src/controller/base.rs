//! # Base Controller
//!
//! Runs one [`Reconcile`] implementation as a `kube_runtime` controller over
//! the operator resource.
//!
//! Every loop reconciles the single `CSISnapshotController` object. Changes to
//! secondary inputs are mapped back onto it, so a loop never has two
//! reconciles in flight and triggers that arrive mid-run collapse into one
//! re-run afterwards. Around the reconcile logic the driver adds:
//!
//! - a `controller.reconcile` span and metrics per attempt
//! - periodic resync through [`Action::requeue`]
//! - per-target Fibonacci requeue on failure
//! - optional `<Name>Degraded` reporting on the operator resource

use crate::assets::AssetError;
use crate::client::{ClientError, OperatorClient};
use crate::config::OperatorConfig;
use crate::constants::REASON_AS_EXPECTED;
use crate::controller::events::{ClusterEvent, ResourceKind};
use crate::controller::hooks::HookError;
use crate::controller::loglevel::LogLevelError;
use crate::controller::status::{self, ConflictRetry};
use crate::controller::supervisor::Runnable;
use crate::controller::version::VersionGetter;
use crate::crd::{CSISnapshotController, Condition, ConditionStatus};
use crate::observability::metrics;
use crate::runtime::error_policy::RequeuePolicy;
use crate::runtime::watch_loop;
use async_trait::async_trait;
use kube::{Client, ResourceExt};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};

/// Reason set on `<Name>Degraded` when a reconcile fails
pub const REASON_SYNC_ERROR: &str = "SyncError";

/// Error returned by a reconcile attempt
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Pipeline(#[from] HookError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    LogLevel(#[from] LogLevelError),
    /// Several independent steps failed
    #[error("{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Aggregate(Vec<SyncError>),
}

impl SyncError {
    /// Fold a list of errors into one, `None` when the list is empty
    #[must_use]
    pub fn aggregate(mut errors: Vec<SyncError>) -> Option<SyncError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(SyncError::Aggregate(errors)),
        }
    }

    /// Whether the same attempt may succeed later without any change in the cluster
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Client(e) => e.is_transient(),
            SyncError::Pipeline(_) | SyncError::Asset(_) | SyncError::LogLevel(_) => false,
            SyncError::Aggregate(errors) => errors.iter().all(SyncError::is_transient),
        }
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        match self {
            SyncError::Client(e) => e.is_conflict(),
            SyncError::Aggregate(errors) => errors.iter().all(SyncError::is_conflict),
            _ => false,
        }
    }
}

/// Reconcile logic of one control loop
#[async_trait]
pub trait Reconcile: Send + Sync + 'static {
    /// Controller name, also the prefix of its conditions
    fn name(&self) -> &str;

    /// Secondary inputs whose changes should trigger this controller
    ///
    /// The operator resource itself always triggers it.
    fn watches(&self) -> &[ResourceKind];

    /// Whether a change to a watched object concerns this controller
    fn wants(&self, event: &ClusterEvent) -> bool {
        self.watches().contains(&event.kind)
    }

    /// Bring the cluster in line with the operator resource called `name`
    async fn reconcile(&self, name: &str) -> Result<(), SyncError>;
}

/// Writes `<Name>Degraded` on the operator resource
#[derive(Clone)]
pub struct DegradedReporter {
    client: Arc<dyn OperatorClient>,
    retry: ConflictRetry,
}

impl std::fmt::Debug for DegradedReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DegradedReporter")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl DegradedReporter {
    #[must_use]
    pub fn new(client: Arc<dyn OperatorClient>, retry: ConflictRetry) -> Self {
        Self { client, retry }
    }

    async fn report(&self, controller: &str, error: Option<&SyncError>) -> Result<(), ClientError> {
        let condition = match error {
            Some(e) => Condition::new(format!("{controller}Degraded"), ConditionStatus::True)
                .with_reason(REASON_SYNC_ERROR)
                .with_message(e.to_string()),
            None => Condition::new(format!("{controller}Degraded"), ConditionStatus::False)
                .with_reason(REASON_AS_EXPECTED),
        };
        let now = status::now();
        status::update_operator_status(self.client.as_ref(), &self.retry, |s| {
            status::set_condition(&mut s.conditions, condition.clone(), &now);
        })
        .await
        .map(|_| ())
    }
}

/// Driver settings shared by every controller
#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// Namespace the operand deployments live in
    pub namespace: String,
    pub resync: Duration,
    pub requeue_min: Duration,
    pub requeue_max: Duration,
    /// Delay before a controller whose watch streams ended is started again
    pub restart_delay: Duration,
}

impl DriverSettings {
    #[must_use]
    pub fn from_config(config: &OperatorConfig) -> Self {
        Self {
            namespace: config.operator_namespace.clone(),
            resync: config.resync_interval(),
            requeue_min: config.requeue_backoff_start(),
            requeue_max: config.requeue_backoff_max(),
            restart_delay: config.watch_restart_delay(),
        }
    }
}

/// A failed reconcile and the delay chosen before the next attempt
#[derive(Debug, Error)]
#[error("{source}")]
pub struct ReconcileFailure {
    pub source: SyncError,
    /// Consecutive failures of this target, including this one
    pub failures: u32,
    pub retry_after: Duration,
}

/// State shared by every reconcile of one controller
pub struct ControllerContext<R: Reconcile> {
    reconciler: Arc<R>,
    resync: Duration,
    requeue: RequeuePolicy,
    degraded: Option<DegradedReporter>,
}

impl<R: Reconcile> std::fmt::Debug for ControllerContext<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerContext")
            .field("name", &self.reconciler.name())
            .field("resync", &self.resync)
            .field("reports_degraded", &self.degraded.is_some())
            .finish_non_exhaustive()
    }
}

impl<R: Reconcile> ControllerContext<R> {
    #[must_use]
    pub fn new(
        reconciler: Arc<R>,
        settings: &DriverSettings,
        degraded: Option<DegradedReporter>,
    ) -> Self {
        Self {
            reconciler,
            resync: settings.resync,
            requeue: RequeuePolicy::new(settings.requeue_min, settings.requeue_max),
            degraded,
        }
    }

    #[must_use]
    pub fn reconciler(&self) -> &Arc<R> {
        &self.reconciler
    }

    fn name(&self) -> &str {
        self.reconciler.name()
    }

    async fn report(&self, error: Option<&SyncError>) {
        if let Some(reporter) = &self.degraded {
            if let Err(e) = reporter.report(self.name(), error).await {
                warn!(
                    controller = self.name(),
                    error = %e,
                    "failed to report degraded condition"
                );
            }
        }
    }
}

/// One reconcile attempt of the operator resource
///
/// Success schedules the next resync. Failure records the attempt with the
/// requeue policy, reports `<Name>Degraded` once the policy escalates, and
/// carries the retry delay to the error policy.
pub async fn reconcile_operator<R: Reconcile>(
    operator: Arc<CSISnapshotController>,
    ctx: Arc<ControllerContext<R>>,
) -> Result<Action, ReconcileFailure> {
    let target = operator.name_any();
    let span = tracing::info_span!(
        "controller.reconcile",
        controller = ctx.name(),
        key = target.as_str()
    );
    async {
        let name = ctx.name();
        metrics::increment_reconciliations(name);
        let start = Instant::now();
        let result = ctx.reconciler.reconcile(&target).await;
        metrics::observe_reconciliation_duration(name, start.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                debug!("reconcile succeeded");
                ctx.requeue.on_success(&target);
                ctx.report(None).await;
                metrics::increment_requeues(name, "resync");
                Ok(Action::requeue(ctx.resync))
            }
            Err(source) => {
                metrics::increment_reconciliation_errors(name);
                let decision = ctx.requeue.on_error(name, &target, &source);
                if decision.escalate {
                    ctx.report(Some(&source)).await;
                }
                Err(ReconcileFailure {
                    source,
                    failures: decision.failures,
                    retry_after: decision.delay,
                })
            }
        }
    }
    .instrument(span)
    .await
}

/// A reconciler wired to the cluster
pub struct BaseController<R: Reconcile> {
    pub(crate) client: Client,
    pub(crate) namespace: String,
    pub(crate) restart_delay: Duration,
    pub(crate) context: Arc<ControllerContext<R>>,
    pub(crate) versions: Option<Arc<VersionGetter>>,
}

impl<R: Reconcile> std::fmt::Debug for BaseController<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseController")
            .field("context", &self.context)
            .field("namespace", &self.namespace)
            .field("version_trigger", &self.versions.is_some())
            .finish_non_exhaustive()
    }
}

impl<R: Reconcile> BaseController<R> {
    #[must_use]
    pub fn new(reconciler: R, client: Client, settings: &DriverSettings) -> Self {
        Self::with_parts(reconciler, client, settings, None)
    }

    /// Like [`BaseController::new`], also reporting failures as
    /// `<Name>Degraded` on the operator resource
    #[must_use]
    pub fn reporting(
        reconciler: R,
        client: Client,
        settings: &DriverSettings,
        reporter: DegradedReporter,
    ) -> Self {
        Self::with_parts(reconciler, client, settings, Some(reporter))
    }

    fn with_parts(
        reconciler: R,
        client: Client,
        settings: &DriverSettings,
        degraded: Option<DegradedReporter>,
    ) -> Self {
        Self {
            client,
            namespace: settings.namespace.clone(),
            restart_delay: settings.restart_delay,
            context: Arc::new(ControllerContext::new(Arc::new(reconciler), settings, degraded)),
            versions: None,
        }
    }

    /// Also reconcile whenever `getter` records a new version
    #[must_use]
    pub fn with_version_trigger(mut self, getter: Arc<VersionGetter>) -> Self {
        self.versions = Some(getter);
        self
    }

    #[must_use]
    pub fn reconciler(&self) -> &R {
        self.context.reconciler()
    }
}

#[async_trait]
impl<R: Reconcile> Runnable for BaseController<R> {
    fn name(&self) -> &str {
        self.context.name()
    }

    async fn run(&self, cancel: CancellationToken, workers: usize) {
        watch_loop::run_watch_loop(self, workers, cancel).await;
    }
}

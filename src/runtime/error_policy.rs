//! # Error Policy
//!
//! Requeue and escalation decisions for failed reconciles, and the error
//! policy handed to `kube_runtime`.
//!
//! Backoff state is tracked per controller and target so one failing target
//! never slows down another.

use crate::controller::backoff::FibonacciBackoff;
use crate::controller::base::{ControllerContext, Reconcile, ReconcileFailure, SyncError};
use crate::crd::CSISnapshotController;
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Consecutive transient failures after which a target is reported degraded
pub const TRANSIENT_FAILURES_BEFORE_DEGRADED: u32 = 3;

/// Backoff state for one target
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    fn new(min: Duration, max: Duration) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min, max),
            error_count: 0,
        }
    }
}

/// What to do after a failed reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequeueDecision {
    /// Delay before the target is queued again
    pub delay: Duration,
    /// Consecutive failures of this target, including this one
    pub failures: u32,
    /// Whether the failure should surface as a degraded condition
    pub escalate: bool,
}

/// Per-target Fibonacci requeue policy
#[derive(Debug)]
pub struct RequeuePolicy {
    min: Duration,
    max: Duration,
    states: Mutex<HashMap<String, BackoffState>>,
}

impl RequeuePolicy {
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure and decide when to retry
    pub fn on_error(&self, controller: &str, target: &str, err: &SyncError) -> RequeueDecision {
        let (delay, failures) = {
            let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
            let state = states
                .entry(target.to_string())
                .or_insert_with(|| BackoffState::new(self.min, self.max));
            state.error_count = state.error_count.saturating_add(1);
            (state.backoff.next_backoff(), state.error_count)
        };

        let escalate = !err.is_transient() || failures >= TRANSIENT_FAILURES_BEFORE_DEGRADED;
        let delay_secs = delay.as_secs_f64();
        if err.is_conflict() {
            debug!(
                controller = controller,
                key = target,
                failures = failures,
                delay_secs = delay_secs,
                error = %err,
                "reconcile conflicted, requeueing"
            );
        } else if err.is_transient() {
            warn!(
                controller = controller,
                key = target,
                failures = failures,
                delay_secs = delay_secs,
                error = %err,
                "reconcile failed, requeueing"
            );
        } else {
            error!(
                controller = controller,
                key = target,
                failures = failures,
                delay_secs = delay_secs,
                error = %err,
                "reconcile failed, requeueing"
            );
        }

        RequeueDecision {
            delay,
            failures,
            escalate,
        }
    }

    /// Forget the failure history of a target
    pub fn on_success(&self, target: &str) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(target);
    }
}

/// Schedule the next attempt after a failed reconcile
///
/// The delay was decided when the failure was recorded; this only hands it
/// to the controller runtime.
pub fn handle_reconciliation_error<R: Reconcile>(
    operator: Arc<CSISnapshotController>,
    failure: &ReconcileFailure,
    ctx: Arc<ControllerContext<R>>,
) -> Action {
    let controller = ctx.reconciler().name();
    let error_span = tracing::span!(
        tracing::Level::DEBUG,
        "controller.watch.reconciliation_error",
        controller = controller,
        key = operator.name_any().as_str(),
    );
    let _error_guard = error_span.enter();

    debug!(
        failures = failure.failures,
        retry_after_secs = failure.retry_after.as_secs_f64(),
        "retrying with backoff"
    );
    metrics::increment_requeues(controller, "error-backoff");
    Action::requeue(failure.retry_after)
}

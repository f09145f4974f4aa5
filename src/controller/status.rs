//! # Status Updates
//!
//! Condition helpers and optimistic-concurrency writes.
//!
//! Every status write is a read-modify-write guarded by the resource version
//! that was read. On a conflict the whole cycle is retried with a fresh read,
//! so a concurrent writer's changes are merged instead of overwritten.

use crate::client::{ClientError, OperatorClient};
use crate::config::OperatorConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::crd::{Condition, OperatorStatus};
use crate::observability::metrics;
use chrono::{SecondsFormat, Utc};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Current time in the format used for `lastTransitionTime`
#[must_use]
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Insert or replace a condition by type
///
/// `lastTransitionTime` is kept when the status did not change and set to
/// `now` when it did. Returns whether the condition list changed.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition, now: &str) -> bool {
    match conditions.iter_mut().find(|c| c.r#type == condition.r#type) {
        Some(existing) => {
            condition.last_transition_time = if existing.status == condition.status {
                existing.last_transition_time.clone()
            } else {
                Some(now.to_string())
            };
            if *existing == condition {
                return false;
            }
            *existing = condition;
            true
        }
        None => {
            condition.last_transition_time = Some(now.to_string());
            conditions.push(condition);
            true
        }
    }
}

/// Remove a condition by type; returns whether it was present
pub fn remove_condition(conditions: &mut Vec<Condition>, r#type: &str) -> bool {
    let before = conditions.len();
    conditions.retain(|c| c.r#type != r#type);
    conditions.len() != before
}

/// How often and how fast to retry a conflicting write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRetry {
    /// Retries after the first attempt
    pub retries: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl Default for ConflictRetry {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            retries: DEFAULT_STATUS_CONFLICT_RETRIES,
            backoff_min: Duration::from_millis(DEFAULT_CONFLICT_BACKOFF_START_MS),
            backoff_max: Duration::from_millis(DEFAULT_CONFLICT_BACKOFF_MAX_MS),
        }
    }
}

impl ConflictRetry {
    #[must_use]
    pub fn from_config(config: &OperatorConfig) -> Self {
        Self {
            retries: config.status_conflict_retries,
            backoff_min: config.conflict_backoff_start(),
            backoff_max: config.conflict_backoff_max(),
        }
    }
}

/// Run `op` until it does not conflict, at most `1 + retries` times
///
/// `op` must perform the full read-merge-write cycle. Errors other than a
/// conflict are returned immediately.
pub async fn retry_on_conflict<T, F, Fut>(
    policy: &ConflictRetry,
    object: &str,
    mut op: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut backoff = FibonacciBackoff::new(policy.backoff_min, policy.backoff_max);
    let mut attempt = 0;
    loop {
        match op().await {
            Err(e) if e.is_conflict() => {
                metrics::increment_status_conflicts(object);
                if attempt >= policy.retries {
                    return Err(e);
                }
                attempt += 1;
                let delay = backoff.next_backoff();
                debug!(
                    object = object,
                    attempt = attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "status write conflicted, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

/// Apply `mutate` to the operator status with optimistic concurrency
///
/// Skips the write when `mutate` changes nothing.
pub async fn update_operator_status<F>(
    client: &dyn OperatorClient,
    policy: &ConflictRetry,
    mutate: F,
) -> Result<OperatorStatus, ClientError>
where
    F: Fn(&mut OperatorStatus) + Send + Sync,
{
    let mutate = &mutate;
    retry_on_conflict(policy, "csisnapshotcontroller", move || async move {
        let operator = client.get_operator().await?;
        let resource_version = operator.metadata.resource_version.clone().unwrap_or_default();
        let original = operator.status.unwrap_or_default();
        let mut updated = original.clone();
        mutate(&mut updated);
        if updated == original {
            return Ok(original);
        }
        let written = client
            .update_operator_status(&resource_version, &updated)
            .await?;
        Ok(written.status.unwrap_or_default())
    })
    .await
}

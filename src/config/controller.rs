//! # Operator Configuration
//!
//! Operator-level settings loaded from environment variables.
//!
//! Images and versions are required; everything else has a default. The
//! result is immutable for the lifetime of the process.

use crate::constants::*;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Operator-level configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Version of the operator image, reported as `operator`
    pub operator_version: String,
    /// Version of the operand image, reported as `csi-snapshot-controller`
    pub operand_version: String,
    /// Snapshot controller image reference
    pub operand_image: String,
    /// Admission webhook image reference
    pub webhook_image: String,
    /// Periodic resync interval (seconds)
    pub resync_interval_secs: u64,
    /// Optimistic-concurrency retries for a status write
    pub status_conflict_retries: u32,
    /// Conflict retry backoff starting value (milliseconds)
    pub conflict_backoff_start_ms: u64,
    /// Conflict retry backoff maximum value (milliseconds)
    pub conflict_backoff_max_ms: u64,
    /// Requeue backoff starting value after a failed reconcile (seconds)
    pub requeue_backoff_start_secs: u64,
    /// Requeue backoff maximum value after a failed reconcile (seconds)
    pub requeue_backoff_max_secs: u64,
    /// Workers per controller
    pub workers: usize,
    /// How long shutdown waits for in-flight reconciles (seconds)
    pub shutdown_grace_secs: u64,
    /// Delay before a watch stream is restarted after it ends (seconds)
    pub watch_restart_delay_secs: u64,
    /// Namespace the operator runs in
    pub operator_namespace: String,
}

impl OperatorConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let workers: usize = parse_or_default(&lookup, "WORKERS", 1)?;
        if workers == 0 {
            return Err(ConfigError::Invalid {
                key: "WORKERS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            operator_version: required(&lookup, OPERATOR_VERSION_ENV)?,
            operand_version: required(&lookup, OPERAND_VERSION_ENV)?,
            operand_image: required(&lookup, OPERAND_IMAGE_ENV)?,
            webhook_image: required(&lookup, WEBHOOK_IMAGE_ENV)?,
            resync_interval_secs: parse_or_default(
                &lookup,
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_SECS,
            )?,
            status_conflict_retries: parse_or_default(
                &lookup,
                "STATUS_CONFLICT_RETRIES",
                DEFAULT_STATUS_CONFLICT_RETRIES,
            )?,
            conflict_backoff_start_ms: parse_or_default(
                &lookup,
                "CONFLICT_BACKOFF_START_MS",
                DEFAULT_CONFLICT_BACKOFF_START_MS,
            )?,
            conflict_backoff_max_ms: parse_or_default(
                &lookup,
                "CONFLICT_BACKOFF_MAX_MS",
                DEFAULT_CONFLICT_BACKOFF_MAX_MS,
            )?,
            requeue_backoff_start_secs: parse_or_default(
                &lookup,
                "REQUEUE_BACKOFF_START_SECS",
                DEFAULT_REQUEUE_BACKOFF_START_SECS,
            )?,
            requeue_backoff_max_secs: parse_or_default(
                &lookup,
                "REQUEUE_BACKOFF_MAX_SECS",
                DEFAULT_REQUEUE_BACKOFF_MAX_SECS,
            )?,
            workers,
            shutdown_grace_secs: parse_or_default(
                &lookup,
                "SHUTDOWN_GRACE_SECS",
                DEFAULT_SHUTDOWN_GRACE_SECS,
            )?,
            watch_restart_delay_secs: parse_or_default(
                &lookup,
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            )?,
            operator_namespace: lookup("POD_NAMESPACE")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| OPERATOR_NAMESPACE.to_string()),
        })
    }

    /// Get resync interval duration
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Get conflict backoff start duration
    pub fn conflict_backoff_start(&self) -> Duration {
        Duration::from_millis(self.conflict_backoff_start_ms)
    }

    /// Get conflict backoff max duration
    pub fn conflict_backoff_max(&self) -> Duration {
        Duration::from_millis(self.conflict_backoff_max_ms)
    }

    /// Get requeue backoff start duration
    pub fn requeue_backoff_start(&self) -> Duration {
        Duration::from_secs(self.requeue_backoff_start_secs)
    }

    /// Get requeue backoff max duration
    pub fn requeue_backoff_max(&self) -> Duration {
        Duration::from_secs(self.requeue_backoff_max_secs)
    }

    /// Get shutdown grace duration
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }
}

/// Read a required, non-empty value
fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

/// Read a value or return default; a present but unparsable value is an error
fn parse_or_default<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: v }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            ("OPERATOR_IMAGE_VERSION", "4.16.0"),
            ("OPERAND_IMAGE_VERSION", "4.16.0"),
            ("OPERAND_IMAGE", "quay.io/example/snapshot-controller:v2"),
            ("WEBHOOK_IMAGE", "quay.io/example/snapshot-webhook:v2"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = OperatorConfig::from_lookup(env(&base())).unwrap();
        assert_eq!(config.resync_interval(), Duration::from_secs(20 * 60));
        assert_eq!(config.status_conflict_retries, 5);
        assert_eq!(config.workers, 1);
        assert_eq!(config.operator_namespace, OPERATOR_NAMESPACE);
        assert_eq!(config.conflict_backoff_start(), Duration::from_millis(10));
    }

    #[test]
    fn test_missing_image_is_fatal() {
        let pairs: Vec<_> = base()
            .into_iter()
            .filter(|(k, _)| *k != "WEBHOOK_IMAGE")
            .collect();
        let err = OperatorConfig::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("WEBHOOK_IMAGE")));
    }

    #[test]
    fn test_empty_required_value_is_missing() {
        let mut pairs = base();
        pairs.push(("OPERAND_IMAGE", ""));
        pairs.retain(|(k, v)| *k != "OPERAND_IMAGE" || v.is_empty());
        let err = OperatorConfig::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("OPERAND_IMAGE")));
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let mut pairs = base();
        pairs.push(("RESYNC_INTERVAL_SECS", "60"));
        pairs.push(("WORKERS", "3"));
        let config = OperatorConfig::from_lookup(env(&pairs)).unwrap();
        assert_eq!(config.resync_interval(), Duration::from_secs(60));
        assert_eq!(config.workers, 3);

        let mut pairs = base();
        pairs.push(("STATUS_CONFLICT_RETRIES", "many"));
        let err = OperatorConfig::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "STATUS_CONFLICT_RETRIES",
                ..
            }
        ));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut pairs = base();
        pairs.push(("WORKERS", "0"));
        assert!(matches!(
            OperatorConfig::from_lookup(env(&pairs)),
            Err(ConfigError::Invalid { key: "WORKERS", .. })
        ));
    }
}

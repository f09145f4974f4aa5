//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Name of the ClusterOperator this operator reports to
pub const TARGET_NAME: &str = "csi-snapshot-controller";

/// Namespace the operand deployments live in
pub const TARGET_NAMESPACE: &str = "openshift-cluster-storage-operator";

/// Namespace the operator itself runs in
pub const OPERATOR_NAMESPACE: &str = "openshift-cluster-storage-operator";

/// Name of the cluster-scoped operator custom resource
pub const OPERATOR_CR_NAME: &str = "cluster";

/// Name of the cluster-scoped Infrastructure object holding topology information
pub const INFRASTRUCTURE_NAME: &str = "cluster";

/// Field manager used for server-side apply and status writes
pub const FIELD_MANAGER: &str = "csi-snapshot-controller-operator";

/// Environment variable holding the operator version
pub const OPERATOR_VERSION_ENV: &str = "OPERATOR_IMAGE_VERSION";

/// Environment variable holding the operand version
pub const OPERAND_VERSION_ENV: &str = "OPERAND_IMAGE_VERSION";

/// Environment variable holding the operand (snapshot controller) image
pub const OPERAND_IMAGE_ENV: &str = "OPERAND_IMAGE";

/// Environment variable holding the webhook image
pub const WEBHOOK_IMAGE_ENV: &str = "WEBHOOK_IMAGE";

/// Version record key for the operator itself
pub const OPERATOR_VERSION_NAME: &str = "operator";

/// Version record key for the operand
pub const OPERAND_VERSION_NAME: &str = "csi-snapshot-controller";

/// Periodic resync interval (20 minutes)
pub const DEFAULT_RESYNC_SECS: u64 = 20 * 60;

/// How many times a status write is retried after an optimistic-concurrency conflict
pub const DEFAULT_STATUS_CONFLICT_RETRIES: u32 = 5;

/// Conflict retry backoff starting value (milliseconds)
pub const DEFAULT_CONFLICT_BACKOFF_START_MS: u64 = 10;

/// Conflict retry backoff maximum value (milliseconds)
pub const DEFAULT_CONFLICT_BACKOFF_MAX_MS: u64 = 1000;

/// Requeue backoff starting value after a failed reconcile (seconds)
pub const DEFAULT_REQUEUE_BACKOFF_START_SECS: u64 = 1;

/// Requeue backoff maximum value after a failed reconcile (seconds)
pub const DEFAULT_REQUEUE_BACKOFF_MAX_SECS: u64 = 300;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// How long shutdown waits for in-flight reconciles (seconds)
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;

/// Default delay before restarting a watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Highest verbosity ordinal the log-level mapping may produce
pub const MAX_VERBOSITY: u8 = 10;

/// Placeholder replaced with the operand image in manifest templates
pub const OPERAND_IMAGE_TOKEN: &str = "${OPERAND_IMAGE}";

/// Placeholder replaced with the webhook image in manifest templates
pub const WEBHOOK_IMAGE_TOKEN: &str = "${WEBHOOK_IMAGE}";

/// Placeholder replaced with the log verbosity ordinal in manifest templates
pub const LOG_LEVEL_TOKEN: &str = "${LOG_LEVEL}";

/// Reason used for conditions that are in their expected state
pub const REASON_AS_EXPECTED: &str = "AsExpected";


//! # Controller
//!
//! Control loops of the CSI snapshot controller operator and the machinery
//! they share.
//!
//! - `base`: reconcile of the operator resource (resync, requeue, degraded reporting)
//! - `supervisor`: starts every controller and owns shutdown
//! - `backoff`, `events`: Fibonacci backoff, watched inputs and change notifications
//! - `hooks`: manifest hook pipeline applied before a deployment is written
//! - `resources`, `static_resources`: conditional resource sets and the loop that applies them
//! - `topology`: cluster topology snapshot used by hooks and preconditions
//! - `deployment`: snapshot controller and webhook deployments
//! - `status`: condition bookkeeping and conflict-retried status writes
//! - `version`, `cluster_operator`: rolled-out versions and the aggregated ClusterOperator status
//! - `condition`, `management`, `loglevel`: static conditions, management state, operator verbosity

pub mod backoff;
pub mod base;
pub mod cluster_operator;
pub mod condition;
pub mod deployment;
pub mod events;
pub mod hooks;
pub mod loglevel;
pub mod management;
pub mod resources;
pub mod static_resources;
pub mod status;
pub mod supervisor;
pub mod topology;
pub mod version;

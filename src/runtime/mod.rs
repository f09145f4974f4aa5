//! # Runtime
//!
//! Process wiring around the controllers.
//!
//! - `initialization`: startup sequence and controller construction
//! - `watch_loop`: `kube_runtime` controller per control loop, restarted when its streams end
//! - `error_policy`: requeue backoff, degraded escalation and the controller error policy

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

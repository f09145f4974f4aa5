//! CSI Snapshot Controller Operator Library
//!
//! Deploys the CSI snapshot controller and its admission webhook, keeps the
//! supporting cluster resources in place, and reports the combined health of
//! its control loops on the `csi-snapshot-controller` ClusterOperator.
//! Tests are included in the module files and under `tests/`.
//!
//! ## Quick Start
//!
//! ```rust
//! use csi_snapshot_controller_operator::prelude::*;
//! ```

pub mod assets;
pub mod client;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod server;

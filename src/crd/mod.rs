//! # Custom Resource Definitions
//!
//! Typed cluster objects the operator reads and writes.
//!
//! ## Module Structure
//!
//! - `operator.rs` - The `CSISnapshotController` operator resource (desired state + per-loop conditions)
//! - `cluster_operator.rs` - The `ClusterOperator` object carrying the aggregated status
//! - `infrastructure.rs` - The `Infrastructure` object carrying cluster topology
//! - `logging.rs` - Operator log levels and their verbosity mapping
//! - `status.rs` - Condition types shared by every status object

mod cluster_operator;
mod infrastructure;
mod logging;
mod operator;
mod status;

// Re-export all public types
pub use cluster_operator::{
    ClusterOperator, ClusterOperatorSpec, ClusterOperatorStatus, ObjectReference, OperandVersion,
};
pub use infrastructure::{Infrastructure, InfrastructureSpec, InfrastructureStatus, TopologyMode};
pub use logging::LogLevel;
pub use operator::{CSISnapshotController, ManagementState, OperatorSpec, OperatorStatus};
pub use status::{Condition, ConditionStatus};

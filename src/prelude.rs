//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use csi_snapshot_controller_operator::prelude::*;
//! ```

// Cluster object types
pub use crate::crd::*;

// Client seams
pub use crate::client::{
    ClientError, ClusterOperatorClient, OperatorClient, ResourceApplier, TopologySource,
};

// Controller framework
pub use crate::controller::base::{BaseController, DriverSettings, Reconcile, ReconcileFailure, SyncError};
pub use crate::controller::events::{ChangeNotifier, ClusterEvent, ResourceKind};
pub use crate::controller::supervisor::{Runnable, Supervisor, SupervisorError};

// Pure building blocks
pub use crate::controller::cluster_operator::{aggregate, merge_versions, AggregationInput};
pub use crate::controller::hooks::{HookError, ManifestPipeline};
pub use crate::controller::resources::{Precondition, ResourceSelector, ResourceSet};
pub use crate::controller::topology::TopologySnapshot;

// Configuration
pub use crate::config::{ConfigError, OperatorConfig};

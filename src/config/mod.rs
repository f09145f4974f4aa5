//! # Configuration
//!
//! Process configuration resolved once at startup.
//!
//! - `controller`: operator images, versions and control-loop tuning read from environment variables

pub mod controller;

pub use controller::{ConfigError, OperatorConfig};

//! # Assets
//!
//! Manifest templates compiled into the binary.
//!
//! Templates are raw bytes; deployment templates carry `${...}` placeholders
//! that the hook pipeline fills in.

use thiserror::Error;

/// Asset lookup errors
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset {0} not found")]
    NotFound(String),
}

macro_rules! asset {
    ($name:literal) => {
        (
            $name,
            include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/", $name)) as &[u8],
        )
    };
}

static ASSETS: &[(&str, &[u8])] = &[
    asset!("volumesnapshots.yaml"),
    asset!("volumesnapshotcontents.yaml"),
    asset!("volumesnapshotclasses.yaml"),
    asset!("webhook_config.yaml"),
    asset!("csi_controller_deployment.yaml"),
    asset!("webhook_deployment.yaml"),
    asset!("csi_controller_deployment_pdb.yaml"),
    asset!("webhook_deployment_pdb.yaml"),
];

/// Read an embedded asset by file name
pub fn read_file(name: &str) -> Result<&'static [u8], AssetError> {
    ASSETS
        .iter()
        .find(|(asset_name, _)| *asset_name == name)
        .map(|(_, bytes)| *bytes)
        .ok_or_else(|| AssetError::NotFound(name.to_string()))
}

/// Names of every embedded asset
pub fn names() -> impl Iterator<Item = &'static str> {
    ASSETS.iter().map(|(name, _)| *name)
}

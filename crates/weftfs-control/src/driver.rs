//! Collaborator seams: the local dataset driver and the container
//! runtime.
//!
//! The controller never touches replicas directly; everything goes
//! through [`DatasetDriver`]. The driver is an opaque capability: probe,
//! mount, unmount, destroy. Snapshot creation happens inside the driver;
//! the controller only lists what the driver reports.

use async_trait::async_trait;
use thiserror::Error;

use weftfs_store::{DatasetId, Snapshot};

/// Driver failures, split by whether a retry can help.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DriverError {
    /// The dataset is temporarily busy; retry later.
    #[error("dataset is busy")]
    Busy,

    /// The dataset does not exist locally.
    #[error("dataset not found")]
    NotFound,

    /// Permanent driver failure.
    #[error("driver failure: {0}")]
    Failed(String),
}

impl DriverError {
    /// True when the failure is expected to clear on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, DriverError::Busy)
    }
}

/// What the driver knows about a dataset right now.
#[derive(Clone, Debug, Default)]
pub struct DatasetProbe {
    /// A local replica exists.
    pub exists: bool,
    /// The replica is currently mounted.
    pub mounted: bool,
    /// Snapshots present on the local replica.
    pub snapshots: Vec<Snapshot>,
}

/// The local dataset driver.
#[async_trait]
pub trait DatasetDriver: Send + Sync + 'static {
    /// Reports existence, mount state, and snapshots of a dataset.
    async fn probe(&self, id: &DatasetId) -> Result<DatasetProbe, DriverError>;

    /// Mounts the local replica.
    async fn mount(&self, id: &DatasetId) -> Result<(), DriverError>;

    /// Unmounts the local replica.
    async fn unmount(&self, id: &DatasetId) -> Result<(), DriverError>;

    /// Destroys the local replica and everything under it.
    async fn destroy(&self, id: &DatasetId) -> Result<(), DriverError>;
}

/// Hook into the container runtime, invoked on dataset teardown so stale
/// container links never outlive the data they point at.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Cleans up container links for datasets that no longer exist.
    async fn cleanup_links(&self) -> Result<(), crate::error::ControlError>;
}

/// No-op container runtime for deployments without container
/// integration.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopContainerRuntime;

#[async_trait]
impl ContainerRuntime for NoopContainerRuntime {
    async fn cleanup_links(&self) -> Result<(), crate::error::ControlError> {
        Ok(())
    }
}

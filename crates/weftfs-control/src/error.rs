//! Error types for the control plane.

use thiserror::Error;
use weftfs_store::{DatasetId, StoreError};

use crate::driver::DriverError;

/// Result alias for control-plane operations.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors surfaced by the FSM registry, controllers, and alignment.
#[derive(Debug, Error)]
pub enum ControlError {
    /// No controller exists for the dataset on this node.
    #[error("no controller for dataset {0}")]
    UnknownDataset(DatasetId),

    /// The dataset has a deletion tombstone; it no longer exists
    /// anywhere, and callers must stop caching its id.
    #[error("dataset {0} no longer exists, it was deleted")]
    Deleted(DatasetId),

    /// The controller's event loop has exited.
    #[error("controller for dataset {0} is gone")]
    ControllerGone(DatasetId),

    /// The controller did not accept or answer an event in time.
    #[error("timed out waiting on controller event")]
    EventTimeout,

    /// The controller answered with something other than the required
    /// response event.
    #[error("expected response '{expected}', got '{got}'")]
    UnexpectedResponse {
        /// The response the caller required.
        expected: &'static str,
        /// The response actually received.
        got: String,
    },

    /// The container-runtime hook failed.
    #[error("container runtime error: {0}")]
    Runtime(String),

    /// A dataset-driver failure.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// A coordination-store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A retry loop gave up.
    #[error("{what} did not succeed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Description of the operation that was retried.
        what: String,
        /// How many attempts were made.
        attempts: u32,
        /// The last error observed.
        source: Box<ControlError>,
    },
}

impl ControlError {
    /// True for failures a retry loop should attempt again: driver busy,
    /// store unavailable, event timeouts, and controller replies short of
    /// the required response. Missing datasets and exhausted retries are
    /// permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            ControlError::Driver(e) => e.is_transient(),
            ControlError::Store(e) => e.is_retryable(),
            ControlError::EventTimeout => true,
            ControlError::UnexpectedResponse { .. } => true,
            _ => false,
        }
    }
}

/// Failure of a clone activation, tagged with the step that failed.
///
/// The tag strings are a wire contract with peers coordinating branch
/// creation.
#[derive(Debug, Error)]
pub enum CloneError {
    /// Registering the clone record failed (typically: branch name
    /// already taken).
    #[error("failed-clone-registration: {0}")]
    Registration(#[source] StoreError),

    /// The child dataset's controller could not be initialized.
    #[error("failed-to-initialize-state-machine: {0}")]
    InitStateMachine(#[source] Box<ControlError>),

    /// Claiming mastership of the child dataset failed (someone else got
    /// there first).
    #[error("failed-make-cloner-master: {0}")]
    ClaimMaster(#[source] StoreError),
}

impl CloneError {
    /// The step tag, as exchanged with peers.
    pub fn code(&self) -> &'static str {
        match self {
            CloneError::Registration(_) => "failed-clone-registration",
            CloneError::InitStateMachine(_) => "failed-to-initialize-state-machine",
            CloneError::ClaimMaster(_) => "failed-make-cloner-master",
        }
    }
}

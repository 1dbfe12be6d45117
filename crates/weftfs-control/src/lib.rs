#![warn(missing_docs)]

//! WeftFS control plane: per-dataset state machines, the FSM registry,
//! and mastership alignment.
//!
//! External signals (coordination-store watches, driver hints, RPCs)
//! land on the [`registry::ControllerRegistry`], which locates or lazily
//! creates the dataset's [`controller::ControllerHandle`]. A background
//! reconciler calls [`ControllerRegistry::align_mount_state`] per dataset
//! to converge local mount state with the masters declared in the
//! coordination store.
//!
//! [`ControllerRegistry::align_mount_state`]: registry::ControllerRegistry::align_mount_state

pub mod align;
pub mod config;
pub mod controller;
pub mod driver;
pub mod error;
pub mod registry;
pub mod retry;

pub use config::ControlConfig;
pub use controller::{ControllerHandle, ControllerResponse, FsmStatus};
pub use driver::{ContainerRuntime, DatasetDriver, DatasetProbe, DriverError, NoopContainerRuntime};
pub use error::{CloneError, ControlError, Result};
pub use registry::ControllerRegistry;
pub use retry::{try_until_succeeds, RetryConfig};

#![warn(missing_docs)]

//! WeftFS coordination-store subsystem: linearizable KV client, typed
//! dataset/clone registry, mastership declarations, deletion tombstones.
//!
//! This crate provides the cluster's source of truth:
//! - The [`kv::KvClient`] trait: linearizable single-key operations,
//!   compare-and-set, and ordered replayable watches
//! - [`memory::MemoryKv`], the in-process reference backend
//! - [`registry::RegistryStore`], the typed facade used by every other
//!   subsystem

pub mod config;
pub mod error;
pub mod kv;
pub mod memory;
pub mod registry;
pub mod types;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use kv::{KvClient, KvPair, Precondition, WatchDelta, WatchStream};
pub use memory::MemoryKv;
pub use registry::{RegistryEvent, RegistryStore, RegistryWatch};
pub use types::{DatasetClone, DatasetId, Origin, RegistryDataset, Snapshot, StoreMeta, Timestamp};

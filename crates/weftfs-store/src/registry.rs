//! Typed registry over the coordination store.
//!
//! Three trees hang off the configured root prefix:
//!
//! - `registry/filesystems/{namespace}/{name}` -> [`RegistryDataset`]
//! - `registry/clones/{parent}/{branch}` -> [`DatasetClone`]
//! - `filesystems/masters/{dataset}` -> node id (plain UTF-8)
//!
//! plus `filesystems/deleted/{dataset}`, whose mere presence is a deletion
//! tombstone. Enumerations and watches skip malformed records after
//! logging them; point reads fail instead.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::kv::{KvClient, KvPair, Precondition, WatchDelta, WatchStream};
use crate::types::{DatasetClone, DatasetId, RegistryDataset, StoreMeta};

/// A record stored in one of the registry trees.
pub trait RegistryRecord: DeserializeOwned + Serialize + Send {
    /// Attaches store bookkeeping after a read.
    fn set_meta(&mut self, meta: StoreMeta);
}

impl RegistryRecord for RegistryDataset {
    fn set_meta(&mut self, meta: StoreMeta) {
        self.meta = meta;
    }
}

impl RegistryRecord for DatasetClone {
    fn set_meta(&mut self, meta: StoreMeta) {
        self.meta = meta;
    }
}

fn decode_record<T: RegistryRecord>(pair: &KvPair) -> Result<T> {
    let mut record: T = serde_json::from_slice(&pair.value).map_err(|e| StoreError::Codec {
        key: pair.key.clone(),
        reason: e.to_string(),
    })?;
    record.set_meta(StoreMeta {
        mod_index: pair.mod_index,
    });
    Ok(record)
}

fn encode_record<T: RegistryRecord>(record: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(record).map_err(|e| StoreError::Internal(e.to_string()))
}

/// A change observed through a typed registry watch.
#[derive(Clone, Debug)]
pub enum RegistryEvent<T> {
    /// A record was created or updated.
    Put(T),
    /// A key was removed from the tree.
    Delete {
        /// Full key of the removed record.
        key: String,
        /// Index of the delete.
        mod_index: u64,
    },
}

/// Typed watch over one registry tree.
///
/// Undecodable records are logged and skipped; they never terminate the
/// watch. The stream ends only when the underlying client closes it.
pub struct RegistryWatch<T> {
    stream: WatchStream,
    _marker: PhantomData<fn() -> T>,
}

impl<T: RegistryRecord> RegistryWatch<T> {
    /// Next decoded change, or `None` when the watch is closed.
    pub async fn next(&mut self) -> Option<RegistryEvent<T>> {
        loop {
            match self.stream.next().await? {
                WatchDelta::Put(pair) => match decode_record::<T>(&pair) {
                    Ok(record) => return Some(RegistryEvent::Put(record)),
                    Err(e) => {
                        tracing::warn!(key = %pair.key, error = %e, "skipping undecodable registry record");
                    }
                },
                WatchDelta::Delete { key, mod_index } => {
                    return Some(RegistryEvent::Delete { key, mod_index });
                }
            }
        }
    }
}

/// Typed facade over the coordination store for datasets, clones,
/// mastership, and deletion tombstones.
pub struct RegistryStore {
    kv: Arc<dyn KvClient>,
    config: StoreConfig,
}

impl RegistryStore {
    /// Builds a registry over the given client and root prefix.
    pub fn new(kv: Arc<dyn KvClient>, config: StoreConfig) -> Self {
        Self { kv, config }
    }

    fn filesystems_prefix(&self) -> String {
        format!("{}/registry/filesystems/", self.config.root_prefix)
    }

    fn clones_prefix(&self) -> String {
        format!("{}/registry/clones/", self.config.root_prefix)
    }

    fn filesystem_key(&self, namespace: &str, name: &str) -> String {
        format!("{}{}/{}", self.filesystems_prefix(), namespace, name)
    }

    fn clone_key(&self, parent: &DatasetId, branch: &str) -> String {
        format!("{}{}/{}", self.clones_prefix(), parent, branch)
    }

    fn master_key(&self, id: &DatasetId) -> String {
        format!("{}/filesystems/masters/{}", self.config.root_prefix, id)
    }

    fn deleted_key(&self, id: &DatasetId) -> String {
        format!("{}/filesystems/deleted/{}", self.config.root_prefix, id)
    }

    fn validate_filesystem(f: &RegistryDataset) -> Result<()> {
        if f.id.as_str().is_empty() {
            return Err(StoreError::InvalidArgument("dataset id not set".to_string()));
        }
        if f.owner_id.is_empty() {
            return Err(StoreError::InvalidArgument("owner id not set".to_string()));
        }
        if f.name.is_empty() {
            return Err(StoreError::InvalidArgument("name not set".to_string()));
        }
        Ok(())
    }

    /// Publishes a dataset under `(owner, name)`. The name must be free:
    /// names are claimed with `create`, so a taken name surfaces as
    /// `AlreadyExists`.
    pub async fn set_filesystem(&self, f: &RegistryDataset) -> Result<()> {
        Self::validate_filesystem(f)?;
        let bytes = encode_record(f)?;
        self.kv
            .create(&self.filesystem_key(&f.owner_id, &f.name), bytes)
            .await?;
        Ok(())
    }

    /// Overwrites a dataset only if the precondition still holds, so
    /// concurrent writers cannot clobber each other.
    pub async fn compare_and_set_filesystem(
        &self,
        f: &RegistryDataset,
        precondition: Precondition,
    ) -> Result<()> {
        Self::validate_filesystem(f)?;
        let bytes = encode_record(f)?;
        self.kv
            .compare_and_set(&self.filesystem_key(&f.owner_id, &f.name), bytes, precondition)
            .await?;
        Ok(())
    }

    /// Reads one dataset, with `meta.mod_index` populated.
    pub async fn get_filesystem(&self, namespace: &str, name: &str) -> Result<RegistryDataset> {
        let pair = self.kv.get(&self.filesystem_key(namespace, name)).await?;
        decode_record(&pair)
    }

    /// Removes a dataset name unconditionally.
    pub async fn delete_filesystem(&self, namespace: &str, name: &str) -> Result<()> {
        self.kv.delete(&self.filesystem_key(namespace, name)).await
    }

    /// Removes a dataset name only if the precondition holds.
    pub async fn compare_and_delete_filesystem(
        &self,
        namespace: &str,
        name: &str,
        precondition: Precondition,
    ) -> Result<()> {
        self.kv
            .compare_and_delete(&self.filesystem_key(namespace, name), precondition)
            .await
    }

    /// All published datasets. Malformed entries are logged and omitted.
    pub async fn list_filesystems(&self) -> Result<Vec<RegistryDataset>> {
        let pairs = self.kv.enumerate(&self.filesystems_prefix()).await?;
        Ok(Self::decode_all(&pairs))
    }

    /// Watches the dataset tree from the given index.
    pub async fn watch_filesystems(&self, from_index: u64) -> Result<RegistryWatch<RegistryDataset>> {
        let stream = self
            .kv
            .watch_tree(&self.filesystems_prefix(), from_index)
            .await?;
        Ok(RegistryWatch {
            stream,
            _marker: PhantomData,
        })
    }

    /// Registers a branch under its parent. Branches are append-only
    /// within a parent: an existing `(parent, branch)` key fails with
    /// `AlreadyExists`.
    pub async fn set_clone(&self, c: &DatasetClone) -> Result<()> {
        if c.filesystem_id.as_str().is_empty() {
            return Err(StoreError::InvalidArgument("clone dataset id not set".to_string()));
        }
        if c.origin.filesystem_id.as_str().is_empty() {
            return Err(StoreError::InvalidArgument("clone origin not set".to_string()));
        }
        if c.name.is_empty() {
            return Err(StoreError::InvalidArgument("name not set".to_string()));
        }
        let bytes = encode_record(c)?;
        self.kv
            .create(&self.clone_key(&c.origin.filesystem_id, &c.name), bytes)
            .await?;
        Ok(())
    }

    /// Removes one branch of a parent dataset.
    pub async fn delete_clone(&self, parent: &DatasetId, branch: &str) -> Result<()> {
        self.kv.delete(&self.clone_key(parent, branch)).await
    }

    /// All branches across all parents. Malformed entries are logged and
    /// omitted.
    pub async fn list_clones(&self) -> Result<Vec<DatasetClone>> {
        let pairs = self.kv.enumerate(&self.clones_prefix()).await?;
        Ok(Self::decode_all(&pairs))
    }

    /// Watches the clones tree from the given index.
    pub async fn watch_clones(&self, from_index: u64) -> Result<RegistryWatch<DatasetClone>> {
        let stream = self.kv.watch_tree(&self.clones_prefix(), from_index).await?;
        Ok(RegistryWatch {
            stream,
            _marker: PhantomData,
        })
    }

    fn decode_all<T: RegistryRecord>(pairs: &[KvPair]) -> Vec<T> {
        let mut records = Vec::with_capacity(pairs.len());
        for pair in pairs {
            match decode_record::<T>(pair) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(key = %pair.key, error = %e, "skipping undecodable registry record");
                }
            }
        }
        records
    }

    /// The node currently declared master for a dataset. `NotFound` means
    /// no master is declared, which is a valid state, not a failure.
    pub async fn current_master(&self, id: &DatasetId) -> Result<String> {
        let pair = self.kv.get(&self.master_key(id)).await?;
        String::from_utf8(pair.value)
            .map_err(|_| StoreError::Internal(format!("master entry for {} is not UTF-8", id)))
    }

    /// Declares a master unconditionally. Used by the cluster's assignment
    /// machinery, not by controllers.
    pub async fn set_master(&self, id: &DatasetId, node: &str) -> Result<()> {
        self.kv
            .set(&self.master_key(id), node.as_bytes().to_vec())
            .await?;
        Ok(())
    }

    /// Claims mastership of a dataset that must not have a master yet.
    /// `Conflict` when someone else got there first.
    pub async fn claim_master(&self, id: &DatasetId, node: &str) -> Result<()> {
        self.kv
            .compare_and_set(
                &self.master_key(id),
                node.as_bytes().to_vec(),
                Precondition::Absent,
            )
            .await?;
        Ok(())
    }

    /// Drops the master declaration for a dataset, if any.
    pub async fn delete_master(&self, id: &DatasetId) -> Result<()> {
        match self.kv.delete(&self.master_key(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Writes the deletion tombstone for a dataset. Idempotent.
    pub async fn mark_deleted(&self, id: &DatasetId) -> Result<()> {
        self.kv
            .set(&self.deleted_key(id), b"deleted".to_vec())
            .await?;
        Ok(())
    }

    /// True when the dataset has been deleted cluster-wide.
    pub async fn is_deleted(&self, id: &DatasetId) -> Result<bool> {
        self.kv.exists(&self.deleted_key(id)).await
    }
}

//! The coordination-store client trait.
//!
//! This is the consensus substrate for the whole fabric: a linearizable
//! key-value service with compare-and-set and ordered, replayable watches.
//! `MemoryKv` in this crate is the reference implementation; networked
//! backends must provide the same single-key linearizability and watch
//! ordering guarantees.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// A key with its current value and modification index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KvPair {
    /// Full key path.
    pub key: String,
    /// Raw stored bytes.
    pub value: Vec<u8>,
    /// Store-assigned index of the write that produced this value.
    /// Strictly increasing across all writes.
    pub mod_index: u64,
}

/// Precondition for conditional writes and deletes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Precondition {
    /// The current value must equal these bytes.
    ValueEquals(Vec<u8>),
    /// The current modification index must equal this index.
    IndexEquals(u64),
    /// The key must not exist. Used to claim keys exactly once.
    Absent,
}

/// A single change observed through a watch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchDelta {
    /// A key was created or updated.
    Put(KvPair),
    /// A key was deleted.
    Delete {
        /// The deleted key.
        key: String,
        /// Index of the delete itself.
        mod_index: u64,
    },
}

impl WatchDelta {
    /// The key this change applies to.
    pub fn key(&self) -> &str {
        match self {
            WatchDelta::Put(pair) => &pair.key,
            WatchDelta::Delete { key, .. } => key,
        }
    }

    /// The modification index of this change.
    pub fn mod_index(&self) -> u64 {
        match self {
            WatchDelta::Put(pair) => pair.mod_index,
            WatchDelta::Delete { mod_index, .. } => *mod_index,
        }
    }
}

/// An ordered stream of changes under a watched prefix.
///
/// Changes arrive in modification-index order, each exactly once. Dropping
/// the stream cancels the watch.
pub struct WatchStream {
    rx: mpsc::UnboundedReceiver<WatchDelta>,
}

impl WatchStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<WatchDelta>) -> Self {
        Self { rx }
    }

    /// Next change, or `None` once the backend has closed the watch.
    pub async fn next(&mut self) -> Option<WatchDelta> {
        self.rx.recv().await
    }
}

/// Client for the shared coordination store.
///
/// Single-key operations are linearizable. Watches lose no events for keys
/// present at subscription time, deliver in mod-index order, and can be
/// restarted from any previously observed index. Cancellation is the
/// caller's: drop the future (or wrap it in `tokio::time::timeout`) and no
/// effects beyond network I/O already in flight are produced.
#[async_trait]
pub trait KvClient: Send + Sync + 'static {
    /// Reads a key. `NotFound` when absent.
    async fn get(&self, key: &str) -> Result<KvPair>;

    /// Creates a key. `AlreadyExists` when present. Atomic.
    async fn create(&self, key: &str, value: Vec<u8>) -> Result<KvPair>;

    /// Writes a key unconditionally.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<KvPair>;

    /// Deletes a key. `NotFound` when absent.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Writes a key only if the precondition holds. `Conflict` otherwise.
    /// Atomic.
    async fn compare_and_set(
        &self,
        key: &str,
        value: Vec<u8>,
        precondition: Precondition,
    ) -> Result<KvPair>;

    /// Deletes a key only if the precondition holds. `Conflict` otherwise.
    async fn compare_and_delete(&self, key: &str, precondition: Precondition) -> Result<()>;

    /// True when the key exists. Used for tombstone probes.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// All pairs under a prefix, in lexicographic key order.
    async fn enumerate(&self, prefix: &str) -> Result<Vec<KvPair>>;

    /// Watches every change under a prefix at or beyond `from_index`.
    async fn watch_tree(&self, prefix: &str, from_index: u64) -> Result<WatchStream>;
}

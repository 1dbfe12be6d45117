//! In-memory coordination store.
//!
//! Reference implementation of [`KvClient`]: a `BTreeMap` and an ordered
//! change log behind a single mutex, which makes every single-key operation
//! trivially linearizable and lets watches replay from any observed index.
//! Used by tests and single-node deployments; the change log is retained
//! for the life of the process.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Result, StoreError};
use crate::kv::{KvClient, KvPair, Precondition, WatchDelta, WatchStream};

struct Watcher {
    prefix: String,
    tx: mpsc::UnboundedSender<WatchDelta>,
}

struct Inner {
    /// key -> (value, mod index of the write that produced it)
    data: BTreeMap<String, (Vec<u8>, u64)>,
    /// Index assigned to the next write.
    next_index: u64,
    /// Every change ever applied, in index order.
    log: Vec<WatchDelta>,
    watchers: Vec<Watcher>,
}

/// In-memory, linearizable [`KvClient`] backend.
pub struct MemoryKv {
    inner: Mutex<Inner>,
}

impl MemoryKv {
    /// Creates an empty store. The first write gets modification index 1.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                data: BTreeMap::new(),
                next_index: 1,
                log: Vec::new(),
                watchers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Internal("store mutex poisoned".to_string()))
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn apply(&mut self, delta: WatchDelta) {
        match &delta {
            WatchDelta::Put(pair) => {
                self.data
                    .insert(pair.key.clone(), (pair.value.clone(), pair.mod_index));
            }
            WatchDelta::Delete { key, .. } => {
                self.data.remove(key);
            }
        }
        self.log.push(delta.clone());
        self.watchers.retain(|w| {
            if delta.key().starts_with(&w.prefix) {
                w.tx.send(delta.clone()).is_ok()
            } else {
                !w.tx.is_closed()
            }
        });
    }

    fn allocate_index(&mut self) -> u64 {
        let idx = self.next_index;
        self.next_index += 1;
        idx
    }
}

#[async_trait]
impl KvClient for MemoryKv {
    async fn get(&self, key: &str) -> Result<KvPair> {
        let inner = self.lock()?;
        match inner.data.get(key) {
            Some((value, mod_index)) => Ok(KvPair {
                key: key.to_string(),
                value: value.clone(),
                mod_index: *mod_index,
            }),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn create(&self, key: &str, value: Vec<u8>) -> Result<KvPair> {
        let mut inner = self.lock()?;
        if inner.data.contains_key(key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        let mod_index = inner.allocate_index();
        let pair = KvPair {
            key: key.to_string(),
            value,
            mod_index,
        };
        inner.apply(WatchDelta::Put(pair.clone()));
        Ok(pair)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<KvPair> {
        let mut inner = self.lock()?;
        let mod_index = inner.allocate_index();
        let pair = KvPair {
            key: key.to_string(),
            value,
            mod_index,
        };
        inner.apply(WatchDelta::Put(pair.clone()));
        Ok(pair)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.lock()?;
        if !inner.data.contains_key(key) {
            return Err(StoreError::NotFound(key.to_string()));
        }
        let mod_index = inner.allocate_index();
        inner.apply(WatchDelta::Delete {
            key: key.to_string(),
            mod_index,
        });
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        value: Vec<u8>,
        precondition: Precondition,
    ) -> Result<KvPair> {
        let mut inner = self.lock()?;
        let current = inner.data.get(key);
        let holds = match (&precondition, current) {
            (Precondition::Absent, None) => true,
            (Precondition::Absent, Some(_)) => false,
            (Precondition::ValueEquals(expected), Some((v, _))) => v == expected,
            (Precondition::IndexEquals(expected), Some((_, idx))) => idx == expected,
            (_, None) => false,
        };
        if !holds {
            return Err(StoreError::Conflict(key.to_string()));
        }
        let mod_index = inner.allocate_index();
        let pair = KvPair {
            key: key.to_string(),
            value,
            mod_index,
        };
        inner.apply(WatchDelta::Put(pair.clone()));
        Ok(pair)
    }

    async fn compare_and_delete(&self, key: &str, precondition: Precondition) -> Result<()> {
        let mut inner = self.lock()?;
        let current = inner.data.get(key);
        let holds = match (&precondition, current) {
            (Precondition::Absent, _) | (_, None) => false,
            (Precondition::ValueEquals(expected), Some((v, _))) => v == expected,
            (Precondition::IndexEquals(expected), Some((_, idx))) => idx == expected,
        };
        if !holds {
            return Err(StoreError::Conflict(key.to_string()));
        }
        let mod_index = inner.allocate_index();
        inner.apply(WatchDelta::Delete {
            key: key.to_string(),
            mod_index,
        });
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let inner = self.lock()?;
        Ok(inner.data.contains_key(key))
    }

    async fn enumerate(&self, prefix: &str) -> Result<Vec<KvPair>> {
        let inner = self.lock()?;
        let mut result = Vec::new();
        for (k, (v, idx)) in inner.data.range::<String, _>(prefix.to_string()..) {
            if !k.starts_with(prefix) {
                break;
            }
            result.push(KvPair {
                key: k.clone(),
                value: v.clone(),
                mod_index: *idx,
            });
        }
        Ok(result)
    }

    async fn watch_tree(&self, prefix: &str, from_index: u64) -> Result<WatchStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock()?;
        for delta in &inner.log {
            if delta.mod_index() >= from_index && delta.key().starts_with(prefix) {
                // Receiver is in hand, send cannot fail here.
                let _ = tx.send(delta.clone());
            }
        }
        inner.watchers.push(Watcher {
            prefix: prefix.to_string(),
            tx,
        });
        Ok(WatchStream::new(rx))
    }
}

//! Common fixtures for control-plane integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;

use weftfs_control::{
    ContainerRuntime, ControlConfig, ControlError, ControllerRegistry, DatasetDriver,
    DatasetProbe, DriverError, RetryConfig,
};
use weftfs_store::kv::{KvClient, KvPair, Precondition, WatchStream};
use weftfs_store::{DatasetId, MemoryKv, RegistryStore, StoreConfig, StoreError};

static TRACING: Once = Once::new();

/// Installs a test subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Scriptable dataset driver with call counters.
pub struct MockDriver {
    probes: Mutex<HashMap<DatasetId, DatasetProbe>>,
    mount_errors: Mutex<VecDeque<DriverError>>,
    unmount_errors: Mutex<VecDeque<DriverError>>,
    destroy_error: Mutex<Option<DriverError>>,
    probe_calls: AtomicU32,
    mount_calls: AtomicU32,
    unmount_calls: AtomicU32,
    destroy_calls: AtomicU32,
}

impl MockDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            probes: Mutex::new(HashMap::new()),
            mount_errors: Mutex::new(VecDeque::new()),
            unmount_errors: Mutex::new(VecDeque::new()),
            destroy_error: Mutex::new(None),
            probe_calls: AtomicU32::new(0),
            mount_calls: AtomicU32::new(0),
            unmount_calls: AtomicU32::new(0),
            destroy_calls: AtomicU32::new(0),
        })
    }

    /// Scripts the probe result for one dataset. Datasets without a
    /// script report an existing, unmounted, snapshotless replica.
    pub fn script_probe(&self, id: &DatasetId, probe: DatasetProbe) {
        self.probes.lock().unwrap().insert(id.clone(), probe);
    }

    /// Queues an error for the next mount call.
    pub fn fail_next_mount(&self, error: DriverError) {
        self.mount_errors.lock().unwrap().push_back(error);
    }

    /// Queues an error for the next unmount call.
    pub fn fail_next_unmount(&self, error: DriverError) {
        self.unmount_errors.lock().unwrap().push_back(error);
    }

    /// Makes every destroy call fail with the given error.
    pub fn fail_destroy(&self, error: DriverError) {
        *self.destroy_error.lock().unwrap() = Some(error);
    }

    pub fn probe_calls(&self) -> u32 {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn mount_calls(&self) -> u32 {
        self.mount_calls.load(Ordering::SeqCst)
    }

    pub fn unmount_calls(&self) -> u32 {
        self.unmount_calls.load(Ordering::SeqCst)
    }

    pub fn destroy_calls(&self) -> u32 {
        self.destroy_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatasetDriver for MockDriver {
    async fn probe(&self, id: &DatasetId) -> Result<DatasetProbe, DriverError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .probes
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or(DatasetProbe {
                exists: true,
                mounted: false,
                snapshots: Vec::new(),
            }))
    }

    async fn mount(&self, _id: &DatasetId) -> Result<(), DriverError> {
        self.mount_calls.fetch_add(1, Ordering::SeqCst);
        match self.mount_errors.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn unmount(&self, _id: &DatasetId) -> Result<(), DriverError> {
        self.unmount_calls.fetch_add(1, Ordering::SeqCst);
        match self.unmount_errors.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn destroy(&self, _id: &DatasetId) -> Result<(), DriverError> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        match self.destroy_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Container runtime that counts cleanups and can be made to fail.
pub struct CountingRuntime {
    cleanup_calls: AtomicU32,
    fail: Mutex<Option<String>>,
}

impl CountingRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            cleanup_calls: AtomicU32::new(0),
            fail: Mutex::new(None),
        })
    }

    pub fn fail_with(&self, reason: &str) {
        *self.fail.lock().unwrap() = Some(reason.to_string());
    }

    pub fn cleanup_calls(&self) -> u32 {
        self.cleanup_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for CountingRuntime {
    async fn cleanup_links(&self) -> Result<(), ControlError> {
        self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
        match self.fail.lock().unwrap().clone() {
            Some(reason) => Err(ControlError::Runtime(reason)),
            None => Ok(()),
        }
    }
}

/// KV client that injects a scripted number of `Unavailable` failures on
/// reads before delegating to an in-memory store.
pub struct FlakyKv {
    inner: MemoryKv,
    failing_gets: AtomicU32,
}

impl FlakyKv {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryKv::new(),
            failing_gets: AtomicU32::new(0),
        })
    }

    /// Makes the next `n` get calls fail with `Unavailable`.
    pub fn fail_next_gets(&self, n: u32) {
        self.failing_gets.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl KvClient for FlakyKv {
    async fn get(&self, key: &str) -> Result<KvPair, StoreError> {
        let remaining = self.failing_gets.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_gets.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("injected outage".to_string()));
        }
        self.inner.get(key).await
    }

    async fn create(&self, key: &str, value: Vec<u8>) -> Result<KvPair, StoreError> {
        self.inner.create(key, value).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<KvPair, StoreError> {
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        value: Vec<u8>,
        precondition: Precondition,
    ) -> Result<KvPair, StoreError> {
        self.inner.compare_and_set(key, value, precondition).await
    }

    async fn compare_and_delete(
        &self,
        key: &str,
        precondition: Precondition,
    ) -> Result<(), StoreError> {
        self.inner.compare_and_delete(key, precondition).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key).await
    }

    async fn enumerate(&self, prefix: &str) -> Result<Vec<KvPair>, StoreError> {
        self.inner.enumerate(prefix).await
    }

    async fn watch_tree(&self, prefix: &str, from_index: u64) -> Result<WatchStream, StoreError> {
        self.inner.watch_tree(prefix, from_index).await
    }
}

/// A single-node control plane over a fresh in-memory store.
pub struct TestNode {
    pub store: Arc<RegistryStore>,
    pub driver: Arc<MockDriver>,
    pub runtime: Arc<CountingRuntime>,
    pub registry: Arc<ControllerRegistry>,
}

/// Retry config tuned for tests: fast, deterministic.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 5,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

pub fn test_node(node_id: &str) -> TestNode {
    test_node_with_client(node_id, Arc::new(MemoryKv::new()))
}

pub fn test_node_with_client(node_id: &str, client: Arc<dyn KvClient>) -> TestNode {
    init_tracing();
    let store = Arc::new(RegistryStore::new(client, StoreConfig::default()));
    let driver = MockDriver::new();
    let runtime = CountingRuntime::new();
    let mut config = ControlConfig::new(node_id);
    config.retry = fast_retry();
    let registry = Arc::new(ControllerRegistry::new(
        config,
        store.clone(),
        driver.clone(),
        runtime.clone(),
    ));
    TestNode {
        store,
        driver,
        runtime,
        registry,
    }
}

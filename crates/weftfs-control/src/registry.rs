//! The FSM registry: the process-wide directory of live per-dataset
//! controllers.
//!
//! The registry exclusively owns controllers. Creation is lazy and
//! idempotent; two concurrent initializations of one dataset yield the
//! same handle and exactly one event loop. No coordination-store call and
//! no spawn ever happens while a registry lock is held.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use weftfs_store::{DatasetClone, DatasetId, Origin, RegistryStore, Snapshot};

use crate::config::ControlConfig;
use crate::controller::{Controller, ControllerHandle};
use crate::driver::{ContainerRuntime, DatasetDriver};
use crate::error::{CloneError, ControlError, Result};

/// Directory of live controllers plus the per-node side caches.
pub struct ControllerRegistry {
    config: ControlConfig,
    registry: Arc<RegistryStore>,
    driver: Arc<dyn DatasetDriver>,
    runtime: Arc<dyn ContainerRuntime>,
    controllers: RwLock<HashMap<DatasetId, ControllerHandle>>,
    /// Containers using each dataset, as last reported by the runtime
    /// watcher.
    container_cache: Mutex<HashMap<DatasetId, Vec<String>>>,
    /// Comma-separated listen addresses per server, as gossiped through
    /// the coordination store.
    server_addresses: Mutex<HashMap<String, String>>,
}

impl ControllerRegistry {
    /// Builds the registry for this node.
    pub fn new(
        config: ControlConfig,
        registry: Arc<RegistryStore>,
        driver: Arc<dyn DatasetDriver>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            config,
            registry,
            driver,
            runtime,
            controllers: RwLock::new(HashMap::new()),
            container_cache: Mutex::new(HashMap::new()),
            server_addresses: Mutex::new(HashMap::new()),
        }
    }

    /// This process's stable node identity.
    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    pub(crate) fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &RegistryStore {
        &self.registry
    }

    /// Looks up an existing controller. `UnknownDataset` when this node
    /// has none for the id.
    pub fn controller(&self, id: &DatasetId) -> Result<ControllerHandle> {
        self.lookup(id)
            .ok_or_else(|| ControlError::UnknownDataset(id.clone()))
    }

    pub(crate) fn lookup(&self, id: &DatasetId) -> Option<ControllerHandle> {
        self.controllers
            .read()
            .expect("lock poisoned")
            .get(id)
            .cloned()
    }

    /// Returns the controller for a dataset, creating it if needed.
    ///
    /// Idempotent: concurrent calls for one id return the same handle and
    /// start exactly one event loop. A dataset with a deletion tombstone
    /// never gets a controller; any stale local state is purged and the
    /// call fails with `Deleted`.
    pub async fn init_controller(&self, id: &DatasetId) -> Result<ControllerHandle> {
        // Tombstone probe on every reference, off-lock. The store owns
        // deletion state; a tombstoned dataset never gets a controller,
        // and a stale one is torn down right here.
        if self.registry.is_deleted(id).await? {
            tracing::debug!(dataset = %id, "dataset is tombstoned, purging local state");
            self.delete_dataset(id).await?;
            return Err(ControlError::Deleted(id.clone()));
        }

        if let Some(handle) = self.lookup(id) {
            tracing::debug!(dataset = %id, "reusing existing controller");
            return Ok(handle);
        }

        let (handle, controller) = Controller::new(
            id.clone(),
            self.config.node_id.clone(),
            self.driver.clone(),
            self.config.event_timeout(),
        );

        let controller = {
            let mut controllers = self.controllers.write().expect("lock poisoned");
            if let Some(existing) = controllers.get(id) {
                // Lost the race; the freshly built loop was never spawned.
                tracing::debug!(dataset = %id, "reusing controller inserted concurrently");
                return Ok(existing.clone());
            }
            controllers.insert(id.clone(), handle.clone());
            controller
        };
        // The loop starts only after the write lock is released, and only
        // on the winning path.
        tokio::spawn(controller.run());
        tracing::debug!(dataset = %id, "initialized new controller");
        Ok(handle)
    }

    /// Tears down all local state for a dataset: the controller, the
    /// container cache entry, container links, and the replica itself.
    ///
    /// Side-effect failures are aggregated into one log record and the
    /// call still succeeds: later convergence passes retry whatever is
    /// left, and half-deleted pieces failing to delete again is expected.
    /// The authoritative master mapping is not touched here; it belongs
    /// to the coordination store.
    pub async fn delete_dataset(&self, id: &DatasetId) -> Result<()> {
        tracing::debug!(dataset = %id, "tearing down dataset");
        let mut failures: Vec<String> = Vec::new();

        let handle = {
            self.controllers
                .write()
                .expect("lock poisoned")
                .remove(id)
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.shutdown().await {
                failures.push(format!("controller shutdown: {}", e));
            }
        }

        self.container_cache
            .lock()
            .expect("lock poisoned")
            .remove(id);

        if let Err(e) = self.runtime.cleanup_links().await {
            failures.push(format!("container link cleanup: {}", e));
        }

        if let Err(e) = self.driver.destroy(id).await {
            failures.push(format!("driver destroy: {}", e));
        }

        if !failures.is_empty() {
            tracing::error!(
                dataset = %id,
                failures = ?failures,
                "errors tearing down dataset, possibly because parts were already gone"
            );
        }
        Ok(())
    }

    /// Activates a branch: registers the clone record, spins up the
    /// child's controller, and claims mastership of the child for this
    /// node.
    ///
    /// The order is mandatory. The clone record must exist before the
    /// master claim, so a watcher can never observe a master assignment
    /// for a branch that is not registered.
    pub async fn activate_clone(
        &self,
        parent: &DatasetId,
        parent_snapshot_id: &str,
        child: &DatasetId,
        branch_name: &str,
    ) -> std::result::Result<(), CloneError> {
        let clone = DatasetClone {
            filesystem_id: child.clone(),
            origin: Origin {
                filesystem_id: parent.clone(),
                snapshot_id: parent_snapshot_id.to_string(),
            },
            name: branch_name.to_string(),
            ..Default::default()
        };
        self.registry
            .set_clone(&clone)
            .await
            .map_err(CloneError::Registration)?;

        self.init_controller(child)
            .await
            .map_err(|e| CloneError::InitStateMachine(Box::new(e)))?;

        // Claim the child as ours so it can be mounted here. The
        // prev-absent guard keeps concurrent activators from both
        // winning.
        self.registry
            .claim_master(child, &self.config.node_id)
            .await
            .map_err(CloneError::ClaimMaster)?;

        tracing::debug!(
            parent = %parent,
            child = %child,
            branch = branch_name,
            "activated clone"
        );
        Ok(())
    }

    /// Snapshot list for a dataset as reported by the given server.
    pub fn snapshots_for(&self, server: &str, id: &DatasetId) -> Result<Vec<Snapshot>> {
        Ok(self.controller(id)?.snapshots(server))
    }

    /// Snapshot list for a dataset as reported by its current master.
    pub async fn snapshots_for_current_master(&self, id: &DatasetId) -> Result<Vec<Snapshot>> {
        let master = self.registry.current_master(id).await?;
        self.snapshots_for(&master, id)
    }

    /// Records which containers currently use a dataset.
    pub fn update_containers(&self, id: &DatasetId, containers: Vec<String>) {
        self.container_cache
            .lock()
            .expect("lock poisoned")
            .insert(id.clone(), containers);
    }

    /// Containers last reported for a dataset.
    pub fn containers_for(&self, id: &DatasetId) -> Vec<String> {
        self.container_cache
            .lock()
            .expect("lock poisoned")
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Records a server's comma-separated listen addresses.
    pub fn update_server_addresses(&self, server: &str, addresses: &str) {
        self.server_addresses
            .lock()
            .expect("lock poisoned")
            .insert(server.to_string(), addresses.to_string());
    }

    /// The known addresses of a server; empty when the server is unknown.
    pub fn addresses_for_server(&self, server: &str) -> Vec<String> {
        let cache = self.server_addresses.lock().expect("lock poisoned");
        match cache.get(server) {
            Some(addresses) => addresses.split(',').map(|a| a.to_string()).collect(),
            None => Vec::new(),
        }
    }
}

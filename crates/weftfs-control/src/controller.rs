//! The per-dataset controller: one event loop per dataset replica.
//!
//! Every dataset with (or about to get) a local replica has exactly one
//! controller in the process. The controller serializes all state
//! mutations through a single-consumer event loop; callers talk to it
//! through a [`ControllerHandle`], sending events with per-event reply
//! channels. Read-only state (mount flag, status, snapshot lists) is
//! mirrored into shared cells so lookups never round-trip through the
//! loop.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use weftfs_store::{DatasetId, Snapshot};

use crate::driver::{DatasetDriver, DriverError};
use crate::error::{ControlError, Result};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle state of a controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FsmStatus {
    /// Initial driver probe in progress.
    Discovering,
    /// Replica known, not mounted.
    Inactive,
    /// Driver mount in progress.
    Mounting,
    /// Replica mounted and live.
    Active,
    /// Driver unmount in progress.
    Unmounting,
    /// Unrecoverable driver error; sticky until an explicit reset.
    Failed,
    /// Shutdown received; the loop has exited or is exiting. Final.
    Terminating,
}

impl fmt::Display for FsmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FsmStatus::Discovering => "discovering",
            FsmStatus::Inactive => "inactive",
            FsmStatus::Mounting => "mounting",
            FsmStatus::Active => "active",
            FsmStatus::Unmounting => "unmounting",
            FsmStatus::Failed => "failed",
            FsmStatus::Terminating => "terminating",
        };
        f.write_str(name)
    }
}

/// Named reply to a controller event.
#[derive(Clone, Debug, PartialEq)]
pub enum ControllerResponse {
    /// The replica is mounted.
    Mounted,
    /// The replica is unmounted.
    Unmounted,
    /// The local snapshot list was refreshed from the driver.
    Snapshotted(Vec<Snapshot>),
    /// A peer's snapshot report was recorded.
    SnapshotsUpdated,
    /// A failed controller was reset to inactive.
    Reset,
    /// The event loop is exiting.
    Terminated,
    /// The event could not be carried out.
    Failed(String),
}

impl ControllerResponse {
    /// The wire name of this response event.
    pub fn name(&self) -> String {
        match self {
            ControllerResponse::Mounted => "mounted".to_string(),
            ControllerResponse::Unmounted => "unmounted".to_string(),
            ControllerResponse::Snapshotted(_) => "snapshotted".to_string(),
            ControllerResponse::SnapshotsUpdated => "snapshots-updated".to_string(),
            ControllerResponse::Reset => "reset".to_string(),
            ControllerResponse::Terminated => "terminated".to_string(),
            ControllerResponse::Failed(reason) => format!("failed:{}", reason),
        }
    }
}

enum ControllerEvent {
    Mount {
        reply: oneshot::Sender<ControllerResponse>,
    },
    Unmount {
        reply: oneshot::Sender<ControllerResponse>,
    },
    RefreshSnapshots {
        reply: oneshot::Sender<ControllerResponse>,
    },
    ReportSnapshots {
        server: String,
        snapshots: Vec<Snapshot>,
        reply: oneshot::Sender<ControllerResponse>,
    },
    Reset {
        reply: oneshot::Sender<ControllerResponse>,
    },
    Shutdown {
        reply: oneshot::Sender<ControllerResponse>,
    },
}

/// State mirrored out of the loop for lock-free-ish reads.
struct ControllerShared {
    status: RwLock<FsmStatus>,
    mounted: AtomicBool,
    /// Snapshot lists per reporting server, this node included.
    snapshots: RwLock<HashMap<String, Vec<Snapshot>>>,
}

/// Cheap, cloneable handle to one dataset's controller.
#[derive(Clone)]
pub struct ControllerHandle {
    id: DatasetId,
    tx: mpsc::Sender<ControllerEvent>,
    shared: Arc<ControllerShared>,
    event_timeout: Duration,
}

impl ControllerHandle {
    /// The dataset this controller manages.
    pub fn dataset_id(&self) -> &DatasetId {
        &self.id
    }

    /// True when both handles point at the same controller instance.
    pub fn same_controller(&self, other: &ControllerHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Whether the local replica is currently mounted.
    pub fn mounted(&self) -> bool {
        self.shared.mounted.load(Ordering::SeqCst)
    }

    /// Current lifecycle state.
    pub fn status(&self) -> FsmStatus {
        *self.shared.status.read().expect("lock poisoned")
    }

    /// A stable copy of the snapshot list reported by `server`.
    pub fn snapshots(&self, server: &str) -> Vec<Snapshot> {
        self.shared
            .snapshots
            .read()
            .expect("lock poisoned")
            .get(server)
            .cloned()
            .unwrap_or_default()
    }

    /// Dispatches `mount` and waits for the reply.
    pub async fn mount(&self) -> Result<ControllerResponse> {
        self.request(|reply| ControllerEvent::Mount { reply }).await
    }

    /// Dispatches `unmount` and waits for the reply.
    pub async fn unmount(&self) -> Result<ControllerResponse> {
        self.request(|reply| ControllerEvent::Unmount { reply }).await
    }

    /// Asks the controller to re-read its own snapshot list from the
    /// driver.
    pub async fn refresh_snapshots(&self) -> Result<ControllerResponse> {
        self.request(|reply| ControllerEvent::RefreshSnapshots { reply })
            .await
    }

    /// Records the snapshot list a peer reported for this dataset.
    pub async fn report_snapshots(
        &self,
        server: &str,
        snapshots: Vec<Snapshot>,
    ) -> Result<ControllerResponse> {
        let server = server.to_string();
        self.request(move |reply| ControllerEvent::ReportSnapshots {
            server,
            snapshots,
            reply,
        })
        .await
    }

    /// Clears a sticky `Failed` state.
    pub async fn reset(&self) -> Result<ControllerResponse> {
        self.request(|reply| ControllerEvent::Reset { reply }).await
    }

    /// Stops the event loop. Final.
    pub async fn shutdown(&self) -> Result<ControllerResponse> {
        self.request(|reply| ControllerEvent::Shutdown { reply }).await
    }

    async fn request<F>(&self, make: F) -> Result<ControllerResponse>
    where
        F: FnOnce(oneshot::Sender<ControllerResponse>) -> ControllerEvent,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let send = self.tx.send(make(reply_tx));
        match tokio::time::timeout(self.event_timeout, send).await {
            Err(_) => return Err(ControlError::EventTimeout),
            Ok(Err(_)) => return Err(ControlError::ControllerGone(self.id.clone())),
            Ok(Ok(())) => {}
        }
        match tokio::time::timeout(self.event_timeout, reply_rx).await {
            Err(_) => Err(ControlError::EventTimeout),
            Ok(Err(_)) => Err(ControlError::ControllerGone(self.id.clone())),
            Ok(Ok(response)) => Ok(response),
        }
    }
}

/// The event loop half of a controller. Constructed by the registry,
/// which inserts the handle into its map before spawning this.
pub(crate) struct Controller {
    id: DatasetId,
    node_id: String,
    driver: Arc<dyn DatasetDriver>,
    shared: Arc<ControllerShared>,
    rx: mpsc::Receiver<ControllerEvent>,
}

impl Controller {
    pub(crate) fn new(
        id: DatasetId,
        node_id: String,
        driver: Arc<dyn DatasetDriver>,
        event_timeout: Duration,
    ) -> (ControllerHandle, Controller) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(ControllerShared {
            status: RwLock::new(FsmStatus::Discovering),
            mounted: AtomicBool::new(false),
            snapshots: RwLock::new(HashMap::new()),
        });
        let handle = ControllerHandle {
            id: id.clone(),
            tx,
            shared: shared.clone(),
            event_timeout,
        };
        let controller = Controller {
            id,
            node_id,
            driver,
            shared,
            rx,
        };
        (handle, controller)
    }

    pub(crate) async fn run(mut self) {
        self.discover().await;
        while let Some(event) = self.rx.recv().await {
            match event {
                ControllerEvent::Mount { reply } => {
                    let _ = reply.send(self.handle_mount().await);
                }
                ControllerEvent::Unmount { reply } => {
                    let _ = reply.send(self.handle_unmount().await);
                }
                ControllerEvent::RefreshSnapshots { reply } => {
                    let _ = reply.send(self.handle_refresh().await);
                }
                ControllerEvent::ReportSnapshots {
                    server,
                    snapshots,
                    reply,
                } => {
                    self.record_snapshots(&server, snapshots);
                    let _ = reply.send(ControllerResponse::SnapshotsUpdated);
                }
                ControllerEvent::Reset { reply } => {
                    let _ = reply.send(self.handle_reset());
                }
                ControllerEvent::Shutdown { reply } => {
                    self.set_status(FsmStatus::Terminating);
                    tracing::debug!(dataset = %self.id, "controller shutting down");
                    let _ = reply.send(ControllerResponse::Terminated);
                    return;
                }
            }
        }
        // All handles dropped.
        self.set_status(FsmStatus::Terminating);
    }

    fn status(&self) -> FsmStatus {
        *self.shared.status.read().expect("lock poisoned")
    }

    fn set_status(&self, status: FsmStatus) {
        *self.shared.status.write().expect("lock poisoned") = status;
    }

    fn record_snapshots(&self, server: &str, snapshots: Vec<Snapshot>) {
        self.shared
            .snapshots
            .write()
            .expect("lock poisoned")
            .insert(server.to_string(), snapshots);
    }

    async fn discover(&self) {
        let mut attempt = 0u32;
        loop {
            match self.driver.probe(&self.id).await {
                Ok(probe) => {
                    if probe.exists {
                        self.record_snapshots(&self.node_id, probe.snapshots);
                    }
                    if probe.exists && probe.mounted {
                        self.shared.mounted.store(true, Ordering::SeqCst);
                        self.set_status(FsmStatus::Active);
                    } else {
                        self.set_status(FsmStatus::Inactive);
                    }
                    tracing::debug!(
                        dataset = %self.id,
                        exists = probe.exists,
                        mounted = probe.mounted,
                        "initial probe complete"
                    );
                    return;
                }
                Err(DriverError::Busy) if attempt < 5 => {
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Err(e) => {
                    tracing::error!(dataset = %self.id, error = %e, "initial probe failed");
                    self.set_status(FsmStatus::Failed);
                    return;
                }
            }
        }
    }

    async fn handle_mount(&self) -> ControllerResponse {
        match self.status() {
            FsmStatus::Active => return ControllerResponse::Mounted,
            FsmStatus::Failed => {
                return ControllerResponse::Failed("state machine failed, reset required".into())
            }
            FsmStatus::Terminating => return ControllerResponse::Failed("terminating".into()),
            _ => {}
        }
        self.set_status(FsmStatus::Mounting);
        match self.driver.mount(&self.id).await {
            Ok(()) => {
                self.shared.mounted.store(true, Ordering::SeqCst);
                self.set_status(FsmStatus::Active);
                tracing::debug!(dataset = %self.id, "mounted");
                ControllerResponse::Mounted
            }
            Err(DriverError::Busy) => {
                self.set_status(FsmStatus::Inactive);
                ControllerResponse::Failed("dataset busy".into())
            }
            Err(DriverError::NotFound) => {
                self.set_status(FsmStatus::Inactive);
                ControllerResponse::Failed("dataset not found".into())
            }
            Err(DriverError::Failed(reason)) => {
                tracing::error!(dataset = %self.id, %reason, "mount failed permanently");
                self.set_status(FsmStatus::Failed);
                ControllerResponse::Failed(reason)
            }
        }
    }

    async fn handle_unmount(&self) -> ControllerResponse {
        match self.status() {
            FsmStatus::Inactive => return ControllerResponse::Unmounted,
            FsmStatus::Failed => {
                return ControllerResponse::Failed("state machine failed, reset required".into())
            }
            FsmStatus::Terminating => return ControllerResponse::Failed("terminating".into()),
            _ => {}
        }
        self.set_status(FsmStatus::Unmounting);
        match self.driver.unmount(&self.id).await {
            Ok(()) => {
                self.shared.mounted.store(false, Ordering::SeqCst);
                self.set_status(FsmStatus::Inactive);
                tracing::debug!(dataset = %self.id, "unmounted");
                ControllerResponse::Unmounted
            }
            Err(DriverError::Busy) => {
                self.set_status(FsmStatus::Active);
                ControllerResponse::Failed("dataset busy".into())
            }
            Err(DriverError::NotFound) => {
                // Nothing to unmount.
                self.shared.mounted.store(false, Ordering::SeqCst);
                self.set_status(FsmStatus::Inactive);
                ControllerResponse::Unmounted
            }
            Err(DriverError::Failed(reason)) => {
                tracing::error!(dataset = %self.id, %reason, "unmount failed permanently");
                self.set_status(FsmStatus::Failed);
                ControllerResponse::Failed(reason)
            }
        }
    }

    async fn handle_refresh(&self) -> ControllerResponse {
        match self.driver.probe(&self.id).await {
            Ok(probe) => {
                self.record_snapshots(&self.node_id, probe.snapshots.clone());
                ControllerResponse::Snapshotted(probe.snapshots)
            }
            Err(DriverError::Busy) => ControllerResponse::Failed("dataset busy".into()),
            Err(e) => {
                tracing::error!(dataset = %self.id, error = %e, "snapshot refresh failed");
                self.set_status(FsmStatus::Failed);
                ControllerResponse::Failed(e.to_string())
            }
        }
    }

    fn handle_reset(&self) -> ControllerResponse {
        if self.status() == FsmStatus::Failed {
            self.set_status(FsmStatus::Inactive);
            ControllerResponse::Reset
        } else {
            ControllerResponse::Failed("not in failed state".into())
        }
    }
}

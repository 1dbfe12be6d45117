//! Mastership alignment: converge local mount state with the masters
//! declared in the coordination store.
//!
//! Alignment is invoked on external signals (a driver hint that a replica
//! appeared, a coordination-store event, a periodic tick) and is
//! idempotent: for a stable master mapping, running it twice is the same
//! as running it once.

use weftfs_store::DatasetId;

use crate::controller::ControllerResponse;
use crate::error::{ControlError, Result};
use crate::registry::ControllerRegistry;
use crate::retry::try_until_succeeds;

impl ControllerRegistry {
    /// Converges the dataset's mount state toward the declared master:
    /// mounts when this node is master and the replica is not mounted,
    /// unmounts when it is mounted but mastered elsewhere.
    ///
    /// Transient failures (driver busy, store unavailable, a controller
    /// reply short of the required event) are retried with backoff;
    /// permanent ones (no controller for the dataset) surface
    /// immediately.
    pub async fn align_mount_state(&self, id: &DatasetId) -> Result<()> {
        let what = format!("aligning mount state of {} with masters", id);
        let retry = self.config().retry.clone();
        try_until_succeeds(&retry, &what, || self.align_once(id)).await
    }

    async fn align_once(&self, id: &DatasetId) -> Result<()> {
        let (handle, mounted) = match self.lookup(id) {
            Some(handle) => {
                let mounted = handle.mounted();
                (handle, mounted)
            }
            None => {
                tracing::error!(dataset = %id, "cannot align mount state: no controller");
                return Err(ControlError::UnknownDataset(id.clone()));
            }
        };

        // A failed master read defers the alignment; it is never treated
        // as "no master".
        let master = match self.store().current_master(id).await {
            Ok(node) => Some(node),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };
        let is_master = master.as_deref() == Some(self.node_id());

        tracing::debug!(
            dataset = %id,
            master = master.as_deref().unwrap_or("<none>"),
            node = self.node_id(),
            mounted,
            "aligning mount state"
        );

        if is_master && !mounted {
            // Not mounted but should be: we are the master.
            let response = handle.mount().await?;
            if response != ControllerResponse::Mounted {
                return Err(ControlError::UnexpectedResponse {
                    expected: "mounted",
                    got: response.name(),
                });
            }
        } else if !is_master && mounted {
            // Mounted but should not be: the master is elsewhere.
            let response = handle.unmount().await?;
            if response != ControllerResponse::Unmounted {
                return Err(ControlError::UnexpectedResponse {
                    expected: "unmounted",
                    got: response.name(),
                });
            }
        }
        Ok(())
    }
}

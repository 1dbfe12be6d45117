//! Core identifiers and wire records shared across the fabric.
//!
//! Everything persisted in the coordination store is JSON with PascalCase
//! field names; those names are a cluster-wide wire contract and must not
//! change. The `meta` field on registry records is populated from the store
//! on reads and is never serialized.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Opaque, stable, globally unique identifier of a dataset.
///
/// Assigned once at dataset creation and never reused. The string contents
/// carry no meaning to the controller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetId(String);

impl DatasetId {
    /// Creates a DatasetId from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        DatasetId(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DatasetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DatasetId {
    fn from(s: &str) -> Self {
        DatasetId(s.to_string())
    }
}

/// A point in time with second and nanosecond precision.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since Unix epoch.
    pub secs: u64,
    /// Nanoseconds within the second.
    pub nanos: u32,
}

impl Timestamp {
    /// Returns the current timestamp.
    pub fn now() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time before epoch");
        Self {
            secs: now.as_secs(),
            nanos: now.subsec_nanos(),
        }
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.secs
            .cmp(&other.secs)
            .then_with(|| self.nanos.cmp(&other.nanos))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Store bookkeeping attached to a record when it is read back.
///
/// Populated on reads only; never serialized into the record.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreMeta {
    /// Coordination-store modification index of the key this record was
    /// decoded from.
    pub mod_index: u64,
}

/// An immutable snapshot of a dataset, created by the dataset driver and
/// reported by whichever node holds the replica.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot identifier, unique within its dataset.
    #[serde(rename = "Id")]
    pub id: String,
    /// The dataset this snapshot belongs to.
    #[serde(rename = "FilesystemId")]
    pub filesystem_id: DatasetId,
    /// When the driver created the snapshot.
    #[serde(rename = "CreatedAt", default)]
    pub created_at: Timestamp,
    /// Driver-supplied metadata (author, message, and the like).
    #[serde(rename = "Metadata", default)]
    pub metadata: HashMap<String, String>,
}

/// The externally published identity of a dataset, keyed by
/// `(owner namespace, name)` in the registry tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryDataset {
    /// The dataset identifier.
    #[serde(rename = "Id")]
    pub id: DatasetId,
    /// Owner namespace. Part of the registry key.
    #[serde(rename = "OwnerId")]
    pub owner_id: String,
    /// Human-chosen dataset name. Part of the registry key.
    #[serde(rename = "Name")]
    pub name: String,
    /// Users granted access beyond the owner.
    #[serde(rename = "CollaboratorIds", default)]
    pub collaborator_ids: Vec<String>,
    /// Free-form dataset metadata.
    #[serde(rename = "Metadata", default)]
    pub metadata: HashMap<String, String>,
    /// Store bookkeeping, populated on reads.
    #[serde(skip)]
    pub meta: StoreMeta,
}

/// The origin of a clone: the parent dataset and the snapshot the branch
/// was taken from.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    /// Parent dataset identifier.
    #[serde(rename = "FilesystemId")]
    pub filesystem_id: DatasetId,
    /// Snapshot of the parent the clone was branched at.
    #[serde(rename = "SnapshotId")]
    pub snapshot_id: String,
}

/// A branch of a dataset, keyed by `(parent dataset, branch name)` in the
/// clones tree. Clones form a forest: every non-root dataset has exactly
/// one parent snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetClone {
    /// The child dataset created for this branch.
    #[serde(rename = "FilesystemId")]
    pub filesystem_id: DatasetId,
    /// Where the branch was taken from. `origin.filesystem_id` is the
    /// parent under which this clone is keyed.
    #[serde(rename = "Origin")]
    pub origin: Origin,
    /// Branch name. Part of the clones-tree key.
    #[serde(rename = "Name")]
    pub name: String,
    /// Store bookkeeping, populated on reads.
    #[serde(skip)]
    pub meta: StoreMeta,
}

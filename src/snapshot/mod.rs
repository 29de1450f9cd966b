//! Diagnostic snapshots of running machines.
//!
//! A snapshot records where a machine is and how it got there: its active
//! configuration and its transition history. Hooks, guards and activation
//! data are not captured, so a snapshot cannot bring a machine back; it is
//! meant for logging, debugging and test assertions.

use crate::core::StateHistory;
use crate::runtime::Machine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod error;

pub use error::{SnapshotError, SnapshotFormat};

/// Version identifier for snapshot format
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable view of one machine instance at a point in time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot format version
    pub version: u32,

    /// Unique snapshot identifier
    pub id: Uuid,

    /// Activation id of the captured machine
    pub machine_id: Uuid,

    /// Slot name of the captured machine
    pub machine: String,

    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,

    pub entered: bool,

    /// Active path below the machine, outermost first
    pub configuration: Vec<String>,

    /// Transitions published by the machine itself
    pub history: StateHistory,
}

impl Snapshot {
    pub fn capture(machine: &Machine) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            id: Uuid::new_v4(),
            machine_id: machine.id(),
            machine: machine.name().to_string(),
            timestamp: Utc::now(),
            entered: machine.is_entered(),
            configuration: machine.configuration(),
            history: machine.history(),
        }
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string_pretty(self).map_err(|e| SnapshotError::encode(SnapshotFormat::Json, e))
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(json)
            .map_err(|e| SnapshotError::decode(SnapshotFormat::Json, e))?;
        snapshot.check_version()
    }

    /// Compact binary encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        bincode::serialize(self).map_err(|e| SnapshotError::encode(SnapshotFormat::Binary, e))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: Self = bincode::deserialize(bytes)
            .map_err(|e| SnapshotError::decode(SnapshotFormat::Binary, e))?;
        snapshot.check_version()
    }

    fn check_version(self) -> Result<Self, SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        Ok(self)
    }
}

impl Machine {
    /// Capture a diagnostic [`Snapshot`] of this machine.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(self)
    }
}

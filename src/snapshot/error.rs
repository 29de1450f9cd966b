//! Errors raised while writing or reading machine snapshots.

use std::fmt;
use thiserror::Error;

/// Encoding a snapshot was being written to or read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotFormat {
    Json,
    Binary,
}

impl fmt::Display for SnapshotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("JSON"),
            Self::Binary => f.write_str("binary"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The snapshot could not be written
    #[error("cannot encode machine snapshot as {format}: {reason}")]
    Encode {
        format: SnapshotFormat,
        reason: String,
    },
    /// The input is not a snapshot in the expected encoding
    #[error("cannot decode {format} machine snapshot: {reason}")]
    Decode {
        format: SnapshotFormat,
        reason: String,
    },
    #[error("snapshot layout v{found} cannot be read by this build (reads v{supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

impl SnapshotError {
    pub(crate) fn encode(format: SnapshotFormat, reason: impl fmt::Display) -> Self {
        Self::Encode {
            format,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn decode(format: SnapshotFormat, reason: impl fmt::Display) -> Self {
        Self::Decode {
            format,
            reason: reason.to_string(),
        }
    }
}

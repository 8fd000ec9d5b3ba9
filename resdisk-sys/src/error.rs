// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use thiserror::Error;

/// Error types for resource disk activation
#[derive(Error, Debug)]
pub enum ResourceDiskError {
    /// The ephemeral device could not be located
    #[error("unable to detect disk topology")]
    Topology,

    #[error("could not determine partition info for {device}: {reason}")]
    PartitionTable { device: String, reason: String },

    #[error("partitioning {device} failed: {reason}")]
    Partitioning { device: String, reason: String },

    #[error("could not mount {partition} after syncing partition table: {reason}")]
    Mount { partition: String, reason: String },

    #[error("swap provisioning failed for {path:?}: {reason}")]
    Swap { path: PathBuf, reason: String },

    #[error("could not allocate {size} bytes at {path:?}")]
    Allocation { path: PathBuf, size: u64 },

    #[error("invalid allocation size: {0}")]
    InvalidSize(i64),

    #[error("failed to execute `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error in {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for resource disk operations
pub type Result<T> = std::result::Result<T, ResourceDiskError>;

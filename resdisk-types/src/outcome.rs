// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{PartitionTableSnapshot, SwapFileDescriptor};

/// Successful activation of the resource disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationOutcome {
    /// Where the disk is mounted; an existing mount wins over the configured path
    pub mount_point: PathBuf,

    /// The raw device, e.g. `/dev/sdb`
    pub device: PathBuf,

    /// True when the device was already mounted and nothing was touched
    pub already_mounted: bool,
}

/// Result of swap provisioning on an activated disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapOutcome {
    pub path: PathBuf,
    pub size_bytes: u64,

    /// True when a matching, active swap file was already in place
    pub unchanged: bool,
}

/// What a full run produced; failures are already logged and reported
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub activation: Option<ActivationOutcome>,
    pub swap: Option<SwapOutcome>,
}

impl RunSummary {
    pub fn mount_point(&self) -> Option<&PathBuf> {
        self.activation.as_ref().map(|outcome| &outcome.mount_point)
    }
}

/// Read-only view of the resource disk, used for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectReport {
    pub device: Option<PathBuf>,
    pub existing_mount_point: Option<PathBuf>,
    pub partition_table: Option<PartitionTableSnapshot>,
    pub swap_file: Option<SwapFileDescriptor>,
}

// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::FilesystemType;

pub const DEFAULT_MOUNT_POINT: &str = "/mnt/resource";
pub const DEFAULT_FILESYSTEM: &str = "ext4";

/// Name of the notice written at the root of every activated mount
pub const WARNING_FILE_NAME: &str = "DATALOSS_WARNING_README.txt";

/// Name of the swap file kept at the root of the mount
pub const SWAP_FILE_NAME: &str = "swapfile";

/// Read-only settings resolved once before activation begins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDiskConfig {
    /// Partition, format and mount the resource disk at all
    pub enable_formatting: bool,

    /// Provision a swap file on the mounted disk
    pub enable_swap: bool,

    /// Directory the disk is mounted at
    pub mount_point: PathBuf,

    pub filesystem_type: FilesystemType,

    /// Swap file size in megabytes; zero disables swap even when enabled
    pub swap_size_mb: u64,

    /// Passed to `mount -o` verbatim
    pub mount_options: Option<String>,

    /// Block device name (e.g. `sdb`) to use instead of vmbus discovery
    pub device_override: Option<String>,

    /// Directory receiving one JSON file per activation event
    pub event_dir: Option<PathBuf>,
}

impl Default for ResourceDiskConfig {
    fn default() -> Self {
        Self {
            enable_formatting: true,
            enable_swap: false,
            mount_point: PathBuf::from(DEFAULT_MOUNT_POINT),
            filesystem_type: FilesystemType::parse(DEFAULT_FILESYSTEM),
            swap_size_mb: 0,
            mount_options: None,
            device_override: None,
            event_dir: None,
        }
    }
}

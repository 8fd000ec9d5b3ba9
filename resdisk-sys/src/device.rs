// SPDX-License-Identifier: GPL-3.0-only

//! Resource disk discovery and mount table lookup

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;

pub const VMBUS_DEVICES_ROOT: &str = "/sys/bus/vmbus/devices";

/// The resource disk is the IDE-emulated device on port 1
pub const RESOURCE_DISK_IDE_PORT: u32 = 1;

/// Finds the kernel name (e.g. `sdb`) of the ephemeral disk
pub trait DeviceLocator: Send + Sync {
    fn ephemeral_device(&self) -> Result<Option<String>>;
}

/// The raw disk and its first partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    pub disk: PathBuf,
    pub partition: PathBuf,
}

impl BlockDevice {
    /// Build from a kernel name (`sdb`) or a full path (`/dev/sdb`)
    pub fn from_name(name: &str) -> Self {
        let disk = if name.starts_with('/') {
            PathBuf::from(name)
        } else {
            Path::new("/dev").join(name)
        };
        let partition = PathBuf::from(format!("{}1", disk.display()));
        Self { disk, partition }
    }

    pub fn disk_str(&self) -> String {
        self.disk.to_string_lossy().into_owned()
    }

    pub fn partition_str(&self) -> String {
        self.partition.to_string_lossy().into_owned()
    }
}

/// Locates the resource disk through the Hyper-V vmbus sysfs tree
#[derive(Debug, Clone)]
pub struct VmbusDeviceLocator {
    sysfs_root: PathBuf,
}

impl Default for VmbusDeviceLocator {
    fn default() -> Self {
        Self::new(VMBUS_DEVICES_ROOT)
    }
}

impl VmbusDeviceLocator {
    pub fn new(sysfs_root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: sysfs_root.into(),
        }
    }

    /// Block device name attached to an emulated IDE port (0-3)
    pub fn device_for_ide_port(&self, port: u32) -> Result<Option<String>> {
        let Some((group, port)) = ide_port_guid_prefix(port) else {
            return Ok(None);
        };

        if !self.sysfs_root.exists() {
            debug!("{:?} does not exist", self.sysfs_root);
            return Ok(None);
        }

        let mut children: Vec<PathBuf> = fs::read_dir(&self.sysfs_root)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .collect();
        children.sort();

        for child in children {
            let Ok(device_id) = fs::read_to_string(child.join("device_id")) else {
                continue;
            };
            if !device_id_matches(&device_id, group, port) {
                continue;
            }

            debug!("IDE port {} maps to vmbus device {:?}", port, child);
            let found = find_block_name(&child, 0)?;
            if found.is_none() {
                warn!("vmbus device {:?} has no block device yet", child);
            }
            return Ok(found);
        }

        Ok(None)
    }
}

impl DeviceLocator for VmbusDeviceLocator {
    fn ephemeral_device(&self) -> Result<Option<String>> {
        self.device_for_ide_port(RESOURCE_DISK_IDE_PORT)
    }
}

/// Always answers with a fixed device, e.g. a configured override
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceLocator(pub Option<String>);

impl DeviceLocator for StaticDeviceLocator {
    fn ephemeral_device(&self) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

fn ide_port_guid_prefix(port: u32) -> Option<(&'static str, u32)> {
    match port {
        0 | 1 => Some(("00000000", port)),
        2 | 3 => Some(("00000001", port - 2)),
        _ => None,
    }
}

fn device_id_matches(device_id: &str, group: &str, port: u32) -> bool {
    let mut parts = device_id.trim().trim_start_matches('{').split('-');
    parts.next() == Some(group) && parts.next() == Some(format!("{port:04}").as_str())
}

const MAX_SYSFS_DEPTH: usize = 8;

// Symlinks are not followed; sysfs is full of cycles.
fn find_block_name(dir: &Path, depth: usize) -> Result<Option<String>> {
    if depth > MAX_SYSFS_DEPTH {
        return Ok(None);
    }

    let mut dirs: Vec<(String, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| (entry.file_name().to_string_lossy().into_owned(), entry.path()))
        .collect();
    dirs.sort();

    for (name, path) in &dirs {
        if name == "block" {
            let mut blocks: Vec<String> = fs::read_dir(path)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect();
            blocks.sort();
            if let Some(first) = blocks.into_iter().next() {
                return Ok(Some(first));
            }
        }
        // Older kernels expose `block:sdb` instead of `block/sdb`
        if let Some(device) = name.strip_prefix("block:") {
            return Ok(Some(device.to_string()));
        }
    }

    for (_, path) in dirs {
        if let Some(found) = find_block_name(&path, depth + 1)? {
            return Ok(Some(found));
        }
    }

    Ok(None)
}

/// Mount point of `device` in `mount` output, if any of its partitions is mounted
pub fn existing_mount_point(mount_table: &str, device: &str) -> Option<PathBuf> {
    if device.is_empty() {
        return None;
    }

    mount_table.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let source = fields.next()?;
        if !source.starts_with(device) {
            return None;
        }
        let _on = fields.next()?;
        fields.next().map(PathBuf::from)
    })
}

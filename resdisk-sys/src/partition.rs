// SPDX-License-Identifier: GPL-3.0-only

//! Partition table reconciliation with parted and sfdisk
//!
//! The resource disk must end up with exactly one partition carrying the
//! requested filesystem. Only two stale layouts are repaired here: a GPT
//! table with more than one partition and a legacy table whose first
//! partition is still typed NTFS from a Windows image.

use resdisk_types::{FilesystemType, PartitionEntry, PartitionTableKind, PartitionTableSnapshot};
use tracing::{debug, info, warn};

use crate::cmd::{CommandRunner, ToolCommand};
use crate::device::BlockDevice;
use crate::error::{ResourceDiskError, Result};

const NTFS_TYPE_CODE: &str = "7";
const LINUX_TYPE_CODE: &str = "83";

/// Build the `mkfs.<fs> -F <partition>` command (`-f` for xfs)
pub fn format_command(filesystem: &FilesystemType, partition: &str) -> ToolCommand {
    ToolCommand::new(filesystem.mkfs_command())
        .arg(filesystem.force_flag())
        .arg(partition)
}

/// Parse `parted -s <dev> print` output into the table kind and numbered rows
pub fn parse_parted_print(output: &str) -> (PartitionTableKind, Vec<PartitionEntry>) {
    let mut kind = PartitionTableKind::Legacy;
    let mut saw_label = false;
    let mut entries = Vec::new();

    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(label) = trimmed.strip_prefix("Partition Table:") {
            saw_label = true;
            if label.trim().eq_ignore_ascii_case("gpt") {
                kind = PartitionTableKind::Gpt;
            }
            continue;
        }

        let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            continue;
        }
        let Ok(index) = digits.parse::<u32>() else {
            continue;
        };
        entries.push(PartitionEntry {
            index,
            descriptor: trimmed[digits.len()..].trim().to_string(),
        });
    }

    // Older parted builds print the label without the "Partition Table:" prefix.
    if !saw_label && output.contains("gpt") {
        kind = PartitionTableKind::Gpt;
    }

    (kind, entries)
}

/// Ensures the resource disk carries one partition with the requested filesystem
pub struct PartitionManager<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> PartitionManager<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Read the partition table; a failure here means the topology cannot be trusted
    pub fn read_table(&self, device: &BlockDevice) -> Result<PartitionTableSnapshot> {
        let disk = device.disk_str();
        let output = self
            .runner
            .run_capture(&ToolCommand::new("parted").arg("-s").arg(&disk).arg("print"))
            .map_err(|e| ResourceDiskError::PartitionTable {
                device: disk.clone(),
                reason: e.to_string(),
            })?;
        if !output.success() {
            return Err(ResourceDiskError::PartitionTable {
                device: disk,
                reason: output.error_text(),
            });
        }
        debug!("parted print {}:\n{}", disk, output.stdout);

        let (kind, entries) = parse_parted_print(&output.stdout);
        let legacy_type_code = match kind {
            PartitionTableKind::Gpt => None,
            PartitionTableKind::Legacy => Some(self.read_legacy_type_code(&disk)),
        };

        Ok(PartitionTableSnapshot {
            kind,
            entries,
            legacy_type_code,
        })
    }

    // An unknown type code leaves the partition untouched.
    fn read_legacy_type_code(&self, disk: &str) -> String {
        let command = ToolCommand::new("sfdisk").arg("--part-type").arg(disk).arg("1");
        let output = match self.runner.run_capture(&command) {
            Ok(output) => output,
            Err(e) => {
                warn!("Could not read partition 1 type: {}", e);
                return String::new();
            }
        };
        if !output.success() {
            debug!("sfdisk could not read partition 1 type: {}", output.error_text());
        }
        output.stdout.trim_end().to_string()
    }

    /// Reconcile the partition layout and return the partition device path
    pub fn ensure_partition(
        &self,
        device: &BlockDevice,
        filesystem: &FilesystemType,
    ) -> Result<String> {
        info!("Examining partition table");
        let snapshot = self.read_table(device)?;

        if snapshot.is_gpt() {
            self.reconcile_gpt(device, filesystem, &snapshot)?;
        } else {
            self.reconcile_legacy(device, filesystem, &snapshot)?;
        }

        Ok(device.partition_str())
    }

    fn reconcile_gpt(
        &self,
        device: &BlockDevice,
        filesystem: &FilesystemType,
        snapshot: &PartitionTableSnapshot,
    ) -> Result<()> {
        let disk = device.disk_str();
        info!("GPT detected, found {} partition(s)", snapshot.entries.len());
        if snapshot.entries.len() <= 1 {
            return Ok(());
        }

        info!("Removing old GPT partitions");
        for index in snapshot.indices() {
            info!("Remove partition {}", index);
            self.run_step(
                &disk,
                ToolCommand::new("parted")
                    .arg("-s")
                    .arg(&disk)
                    .arg("rm")
                    .arg(index.to_string()),
            )?;
        }

        info!("Creating new GPT partition");
        self.run_step(
            &disk,
            ToolCommand::new("parted")
                .arg("-s")
                .arg(&disk)
                .arg("mkpart")
                .arg("primary")
                .arg("0%")
                .arg("100%"),
        )?;

        self.format(device, filesystem)
    }

    fn reconcile_legacy(
        &self,
        device: &BlockDevice,
        filesystem: &FilesystemType,
        snapshot: &PartitionTableSnapshot,
    ) -> Result<()> {
        let disk = device.disk_str();
        let type_code = snapshot.legacy_type_code.as_deref().unwrap_or_default();
        info!("GPT not detected, partition type is {:?}", type_code);

        if type_code != NTFS_TYPE_CODE || filesystem.is_ntfs() {
            return Ok(());
        }

        info!(
            "The partition is formatted with ntfs, updating partition type to {}",
            LINUX_TYPE_CODE
        );
        self.run_step(
            &disk,
            ToolCommand::new("sfdisk")
                .arg("--part-type")
                .arg(&disk)
                .arg("1")
                .arg(LINUX_TYPE_CODE),
        )?;

        self.format(device, filesystem)
    }

    /// Format the first partition, overwriting whatever is there
    pub fn format(&self, device: &BlockDevice, filesystem: &FilesystemType) -> Result<()> {
        let command = format_command(filesystem, &device.partition_str());
        info!("Format partition [{}]", command);
        self.run_step(&device.disk_str(), command)
    }

    // A non-zero exit is logged and tolerated; the mount escalation repairs
    // what a failed step leaves behind. Not being able to run the tool at
    // all is fatal.
    fn run_step(&self, disk: &str, command: ToolCommand) -> Result<()> {
        let output = self.runner.run_capture(&command).map_err(|e| match e {
            ResourceDiskError::Spawn { command, source } => ResourceDiskError::Partitioning {
                device: disk.to_string(),
                reason: format!("{command}: {source}"),
            },
            other => other,
        })?;
        if !output.success() {
            warn!("`{}` failed: {}", command, output.error_text());
        }
        Ok(())
    }
}

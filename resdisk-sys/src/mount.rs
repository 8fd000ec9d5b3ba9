// SPDX-License-Identifier: GPL-3.0-only

//! Mounting the resource disk partition
//!
//! Mounting escalates through at most three attempts: a plain mount, a mount
//! after forcing the kernel to re-read the partition table, and a mount after
//! reformatting the partition. Each step runs only after the previous one
//! failed. There are no sleeps between attempts.

use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use resdisk_types::FilesystemType;
use tracing::{info, warn};

use crate::cmd::{CommandRunner, ToolCommand};
use crate::device::{BlockDevice, existing_mount_point};
use crate::error::{ResourceDiskError, Result};
use crate::partition::PartitionManager;

/// Mode of a freshly created mount directory
pub const MOUNT_DIR_MODE: u32 = 0o755;

/// Upper bound on mount invocations for one activation
pub const MAX_MOUNT_ATTEMPTS: usize = 3;

/// Build `mount [-o <options>] <partition> <target>`
pub fn mount_command(options: Option<&str>, partition: &str, target: &Path) -> ToolCommand {
    let mut command = ToolCommand::new("mount");
    if let Some(options) = options.filter(|options| !options.trim().is_empty()) {
        command = command.arg("-o").arg(options);
    }
    command.arg(partition).path_arg(target)
}

pub struct MountExecutor<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> MountExecutor<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Where the device is already mounted, according to the live mount table
    pub fn existing_mount(&self, device: &BlockDevice) -> Result<Option<PathBuf>> {
        let output = self.runner.run_capture(&ToolCommand::new("mount"))?;
        if !output.success() {
            warn!("Could not list mounts: {}", output.error_text());
            return Ok(None);
        }
        Ok(existing_mount_point(&output.stdout, &device.disk_str()))
    }

    /// Mount the first partition of `device` at `target`
    pub fn mount(
        &self,
        device: &BlockDevice,
        filesystem: &FilesystemType,
        options: Option<&str>,
        target: &Path,
    ) -> Result<PathBuf> {
        create_mount_dir(target)?;

        let partition = device.partition_str();
        let command = mount_command(options, &partition, target);
        info!("Mount resource disk [{}]", command);

        let mut last_error = match self.attempt(&command)? {
            None => return self.mounted(device, target, filesystem),
            Some(error) => error,
        };

        // Some kernels re-read the partition table asynchronously after
        // parted runs, and a mount issued meanwhile fails. Force a
        // synchronous re-read and try again.
        warn!(
            "Failed to mount resource disk ({}). Retry mounting after re-reading partition info.",
            last_error
        );
        self.reread_partition_table(device);
        last_error = match self.attempt(&command)? {
            None => return self.mounted(device, target, filesystem),
            Some(error) => error,
        };

        warn!(
            "Failed to mount resource disk ({}). Attempting to format and retry mount.",
            last_error
        );
        if let Err(e) = PartitionManager::new(self.runner).format(device, filesystem) {
            warn!("Could not format {}: {}", partition, e);
        }
        last_error = match self.attempt(&command)? {
            None => return self.mounted(device, target, filesystem),
            Some(error) => error,
        };

        Err(ResourceDiskError::Mount {
            partition,
            reason: last_error,
        })
    }

    // Ok(None) on success, Ok(Some(text)) when mount exited non-zero.
    fn attempt(&self, command: &ToolCommand) -> Result<Option<String>> {
        let output = self.runner.run_capture(command)?;
        if output.success() {
            Ok(None)
        } else {
            Ok(Some(output.error_text()))
        }
    }

    fn reread_partition_table(&self, device: &BlockDevice) {
        let disk = device.disk_str();
        let sfdisk = ToolCommand::new("sfdisk").arg("-R").arg(&disk);
        match self.runner.run(&sfdisk) {
            Ok(0) => return,
            Ok(status) => info!("`{}` exited with {}, trying blockdev", sfdisk, status),
            Err(e) => info!("`{}` unavailable ({}), trying blockdev", sfdisk, e),
        }

        let blockdev = ToolCommand::new("blockdev").arg("--rereadpt").arg(&disk);
        match self.runner.run(&blockdev) {
            Ok(0) => {}
            Ok(status) => warn!("`{}` exited with {}", blockdev, status),
            Err(e) => warn!("`{}` failed: {}", blockdev, e),
        }
    }

    fn mounted(
        &self,
        device: &BlockDevice,
        target: &Path,
        filesystem: &FilesystemType,
    ) -> Result<PathBuf> {
        info!(
            "Resource disk {} is mounted at {} with {}",
            device.disk.display(),
            target.display(),
            filesystem
        );
        Ok(target.to_path_buf())
    }
}

fn create_mount_dir(target: &Path) -> Result<()> {
    if target.is_dir() {
        return Ok(());
    }
    DirBuilder::new()
        .recursive(true)
        .mode(MOUNT_DIR_MODE)
        .create(target)?;
    Ok(())
}

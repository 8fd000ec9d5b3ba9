// SPDX-License-Identifier: GPL-3.0-only

//! Resource disk activation
//!
//! [`ResourceDiskHandler`] sequences device discovery, partitioning, mounting,
//! the data loss notice and swap provisioning. Errors from those steps are
//! caught here, logged and reported as events; nothing escapes to the caller.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use resdisk_types::{
    ActivationEvent, ActivationOutcome, EventOperation, InspectReport, ResourceDiskConfig,
    RunSummary, SwapOutcome, WARNING_FILE_NAME,
};
use tracing::{error, info, warn};

use crate::cmd::CommandRunner;
use crate::device::{BlockDevice, DeviceLocator};
use crate::error::{ResourceDiskError, Result};
use crate::events::EventSink;
use crate::mount::MountExecutor;
use crate::partition::PartitionManager;
use crate::swap::SwapFileProvisioner;

pub const DATA_LOSS_WARNING: &str = "\
WARNING: THIS IS A TEMPORARY DISK.

Any data stored on this drive is SUBJECT TO LOSS and THERE IS NO WAY TO RECOVER IT.

Please do not use this disk for storing any personal or application data.

For additional details to please refer to the MSDN documentation at :
http://msdn.microsoft.com/en-us/library/windowsazure/jj672979.aspx
";

pub struct ResourceDiskHandler {
    config: ResourceDiskConfig,
    runner: Arc<dyn CommandRunner>,
    locator: Arc<dyn DeviceLocator>,
    events: Arc<dyn EventSink>,
}

impl ResourceDiskHandler {
    pub fn new(
        config: ResourceDiskConfig,
        runner: Arc<dyn CommandRunner>,
        locator: Arc<dyn DeviceLocator>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            runner,
            locator,
            events,
        }
    }

    pub fn config(&self) -> &ResourceDiskConfig {
        &self.config
    }

    /// Activate the disk if formatting is enabled, then swap if enabled
    pub fn run(&self) -> RunSummary {
        let mut summary = RunSummary::default();

        if self.config.enable_formatting {
            summary.activation = self.activate_resource_disk();
        } else {
            info!("Resource disk formatting is disabled");
        }

        if self.config.enable_swap {
            if let Some(mount_point) = summary.mount_point().cloned() {
                summary.swap = self.enable_swap(&mount_point);
            }
        }

        summary
    }

    /// Mount the resource disk and drop the data loss notice on it
    pub fn activate_resource_disk(&self) -> Option<ActivationOutcome> {
        info!("Activate resource disk");
        let started = Instant::now();

        match self.mount_resource_disk() {
            Ok(outcome) => {
                self.write_warning_file(&outcome.mount_point);
                self.report(
                    EventOperation::ActivateResourceDisk,
                    true,
                    format!("Resource disk mounted at {}", outcome.mount_point.display()),
                    started,
                );
                Some(outcome)
            }
            Err(e) => {
                error!("Failed to mount resource disk {}", e);
                self.report(EventOperation::ActivateResourceDisk, false, e.to_string(), started);
                None
            }
        }
    }

    pub fn mount_resource_disk(&self) -> Result<ActivationOutcome> {
        let device = self.locate()?;
        let mounter = MountExecutor::new(&*self.runner);

        if let Some(existing) = mounter.existing_mount(&device)? {
            info!(
                "Resource disk [{}] is already mounted [{}]",
                device.disk.display(),
                existing.display()
            );
            return Ok(ActivationOutcome {
                mount_point: existing,
                device: device.disk,
                already_mounted: true,
            });
        }

        PartitionManager::new(&*self.runner)
            .ensure_partition(&device, &self.config.filesystem_type)?;

        let mount_point = mounter.mount(
            &device,
            &self.config.filesystem_type,
            self.config.mount_options.as_deref(),
            &self.config.mount_point,
        )?;

        Ok(ActivationOutcome {
            mount_point,
            device: device.disk,
            already_mounted: false,
        })
    }

    /// Provision the swap file; failures are reported and swallowed
    pub fn enable_swap(&self, mount_point: &Path) -> Option<SwapOutcome> {
        info!("Enable swap");
        let size_mb = self.config.swap_size_mb;
        if size_mb == 0 {
            info!("Swap size is 0, skipping swap file");
            return None;
        }

        let started = Instant::now();
        match SwapFileProvisioner::new(&*self.runner).provision(mount_point, size_mb) {
            Ok(outcome) => {
                self.report(
                    EventOperation::EnableSwap,
                    true,
                    format!("{}KB of swap at {}", outcome.size_bytes / 1024, outcome.path.display()),
                    started,
                );
                Some(outcome)
            }
            Err(e) => {
                error!("Failed to enable swap {}", e);
                self.report(EventOperation::EnableSwap, false, e.to_string(), started);
                None
            }
        }
    }

    /// Describe the disk as it is, without changing anything
    pub fn inspect(&self) -> Result<InspectReport> {
        let Some(name) = self.locator.ephemeral_device()? else {
            return Ok(InspectReport {
                device: None,
                existing_mount_point: None,
                partition_table: None,
                swap_file: None,
            });
        };
        let device = BlockDevice::from_name(&name);

        let existing_mount_point = MountExecutor::new(&*self.runner).existing_mount(&device)?;

        let partition_table = match PartitionManager::new(&*self.runner).read_table(&device) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("{}", e);
                None
            }
        };

        let swap_file = match &existing_mount_point {
            Some(mount_point) => Some(
                SwapFileProvisioner::new(&*self.runner)
                    .inspect(mount_point, self.config.swap_size_mb)?,
            ),
            None => None,
        };

        Ok(InspectReport {
            device: Some(device.disk),
            existing_mount_point,
            partition_table,
            swap_file,
        })
    }

    fn locate(&self) -> Result<BlockDevice> {
        match self.locator.ephemeral_device()? {
            Some(name) => Ok(BlockDevice::from_name(&name)),
            None => Err(ResourceDiskError::Topology),
        }
    }

    fn write_warning_file(&self, mount_point: &Path) {
        let path = mount_point.join(WARNING_FILE_NAME);
        if let Err(e) = fs::write(&path, DATA_LOSS_WARNING) {
            warn!("Failed to write data loss warning:{}", e);
        }
    }

    fn report(&self, op: EventOperation, is_success: bool, message: String, started: Instant) {
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.events
            .emit(&ActivationEvent::new(op, is_success, message).with_duration_ms(duration_ms));
    }
}

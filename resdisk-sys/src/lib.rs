// SPDX-License-Identifier: GPL-3.0-only

//! Resource disk activation for cloud guest VMs
//!
//! This crate turns the ephemeral disk a hypervisor attaches to a VM into a
//! mounted filesystem with an optional swap file:
//! - Locating the disk through the vmbus sysfs tree
//! - Repairing stale partition tables with parted and sfdisk
//! - Mounting with a bounded re-read and reformat escalation
//! - Preallocating and enabling a swap file on the mount
//!
//! Every operation shells out through [`CommandRunner`] and blocks. These
//! operations require root and should only be called from the agent.

pub mod allocate;
pub mod cmd;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod handler;
pub mod mount;
pub mod partition;
pub mod swap;

pub use allocate::{AllocationStrategy, FileAllocator, ZeroFillPlan};
pub use cmd::{CommandOutput, CommandRunner, SystemRunner, ToolCommand, require_tool};
pub use config::{DEFAULT_CONFIG_PATH, load_config, parse_config};
pub use device::{BlockDevice, DeviceLocator, StaticDeviceLocator, VmbusDeviceLocator};
pub use error::{ResourceDiskError, Result};
pub use events::{EventDirSink, EventSink, MultiSink, TracingEventSink};
pub use handler::{DATA_LOSS_WARNING, ResourceDiskHandler};
pub use mount::MountExecutor;
pub use partition::PartitionManager;
pub use swap::SwapFileProvisioner;

// SPDX-License-Identifier: GPL-3.0-only

//! Test support for resource disk activation
//!
//! Nothing here touches real block devices: tools are answered by
//! [`ScriptedRunner`] and mount points live in temporary directories.

pub mod fixtures;
pub mod runner;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use resdisk_sys::allocate::AllocationStrategy;
use resdisk_sys::{EventSink, ResourceDiskHandler, StaticDeviceLocator};
use resdisk_types::{ActivationEvent, ResourceDiskConfig};
use tempfile::TempDir;

pub use runner::{ScriptedRunner, exit, ok};

/// Event sink that keeps everything it is given
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ActivationEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ActivationEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &ActivationEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}

/// Allocation strategy that sizes the file with `set_len` and records the call
#[derive(Debug, Clone, Default)]
pub struct RecordingStrategy {
    calls: Arc<Mutex<Vec<(PathBuf, u64)>>>,
}

impl RecordingStrategy {
    pub fn calls(&self) -> Vec<(PathBuf, u64)> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl AllocationStrategy for RecordingStrategy {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn allocate(&self, path: &Path, len: u64) -> resdisk_sys::Result<bool> {
        let file = fs::File::create(path)?;
        file.set_len(len)?;
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((path.to_path_buf(), len));
        Ok(true)
    }
}

/// A handler over a scripted runner, with the disk at `/dev/<device>`
pub fn scripted_handler(
    config: ResourceDiskConfig,
    runner: Arc<ScriptedRunner>,
    device: Option<&str>,
    sink: Arc<RecordingSink>,
) -> ResourceDiskHandler {
    ResourceDiskHandler::new(
        config,
        runner,
        Arc::new(StaticDeviceLocator(device.map(str::to_string))),
        sink,
    )
}

/// Configuration with the mount point inside `dir`
pub fn config_in(dir: &Path) -> ResourceDiskConfig {
    ResourceDiskConfig {
        mount_point: dir.join("resource"),
        ..ResourceDiskConfig::default()
    }
}

/// A fake `/sys/bus/vmbus/devices` tree
pub struct FakeVmbus {
    root: TempDir,
}

impl FakeVmbus {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            root: tempfile::tempdir()?,
        })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Attach `block` to the emulated IDE controller at `port`
    pub fn attach(&self, port: u32, block: &str) -> std::io::Result<&Self> {
        let (group, channel) = if port < 2 { (0, port) } else { (1, port - 2) };
        let guid = format!("{group:08}-{channel:04}-8899-0000-000000000000");
        let device = self.root.path().join(&guid);
        fs::create_dir_all(
            device
                .join(format!("host{port}"))
                .join(format!("target{port}:0:{channel}"))
                .join(format!("{port}:0:{channel}:0"))
                .join("block")
                .join(block),
        )?;
        fs::write(device.join("device_id"), format!("{{{guid}}}\n"))?;
        Ok(self)
    }
}

// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;
use std::sync::Arc;

use resdisk_sys::{DeviceLocator, ResourceDiskHandler, VmbusDeviceLocator, load_config};
use resdisk_testing::fixtures::{PARTED_GPT_ONE, mount_table_with_resource};
use resdisk_testing::{FakeVmbus, RecordingSink, ScriptedRunner, config_in, ok};
use resdisk_types::{FilesystemType, SwapFileState};

#[test]
fn resource_disk_is_found_on_ide_port_one() {
    let vmbus = FakeVmbus::new().unwrap();
    vmbus.attach(0, "sda").unwrap().attach(1, "sdb").unwrap();

    let locator = VmbusDeviceLocator::new(vmbus.root());
    assert_eq!(locator.ephemeral_device().unwrap().as_deref(), Some("sdb"));
}

#[test]
fn no_resource_disk_without_port_one() {
    let vmbus = FakeVmbus::new().unwrap();
    vmbus.attach(0, "sda").unwrap();

    let locator = VmbusDeviceLocator::new(vmbus.root());
    assert_eq!(locator.ephemeral_device().unwrap(), None);
}

#[test]
fn inspect_reports_live_state_without_mutation() {
    let vmbus = FakeVmbus::new().unwrap();
    vmbus.attach(1, "sdb").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let mounted_at = dir.path().join("resource");

    let runner = Arc::new(ScriptedRunner::new());
    runner
        .on("mount", ok(&mount_table_with_resource(&mounted_at)))
        .on("parted -s /dev/sdb print", ok(PARTED_GPT_ONE));

    let handler = ResourceDiskHandler::new(
        config_in(dir.path()),
        runner.clone(),
        Arc::new(VmbusDeviceLocator::new(vmbus.root())),
        Arc::new(RecordingSink::default()),
    );

    let report = handler.inspect().unwrap();
    assert_eq!(report.device, Some(PathBuf::from("/dev/sdb")));
    assert_eq!(report.existing_mount_point, Some(mounted_at.clone()));
    assert!(report.partition_table.unwrap().is_gpt());
    assert_eq!(report.swap_file.unwrap().state, SwapFileState::Absent);

    assert_eq!(runner.calls(), vec!["mount", "parted -s /dev/sdb print", "swapon -s"]);
    assert!(!mounted_at.exists());
}

#[test]
fn inspect_without_device_is_empty() {
    let vmbus = FakeVmbus::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new());

    let handler = ResourceDiskHandler::new(
        config_in(dir.path()),
        runner.clone(),
        Arc::new(VmbusDeviceLocator::new(vmbus.root())),
        Arc::new(RecordingSink::default()),
    );

    let report = handler.inspect().unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert!(json["device"].is_null());
    assert!(runner.calls().is_empty());
}

#[test]
fn loads_agent_configuration_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("waagent.conf");
    std::fs::write(
        &path,
        "ResourceDisk.Format=y\n\
         ResourceDisk.Filesystem=ext3\n\
         ResourceDisk.MountPoint=/mnt\n\
         ResourceDisk.EnableSwap=y\n\
         ResourceDisk.SwapSizeMB=1024\n\
         ResourceDisk.Device=sdc\n\
         Logs.EventDir=/var/lib/waagent/events\n",
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.filesystem_type, FilesystemType::Ext3);
    assert_eq!(config.mount_point, PathBuf::from("/mnt"));
    assert!(config.enable_swap);
    assert_eq!(config.swap_size_mb, 1024);
    assert_eq!(config.device_override.as_deref(), Some("sdc"));
    assert_eq!(config.event_dir, Some(PathBuf::from("/var/lib/waagent/events")));
}

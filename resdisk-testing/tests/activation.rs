// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::sync::Arc;

use resdisk_sys::DATA_LOSS_WARNING;
use resdisk_testing::fixtures::{MOUNT_TABLE_OS_ONLY, PARTED_MSDOS, mount_table_with_resource};
use resdisk_testing::{RecordingSink, ScriptedRunner, config_in, exit, ok, scripted_handler};
use resdisk_types::{EventOperation, ResourceDiskConfig, WARNING_FILE_NAME};

fn fresh_disk_runner() -> Arc<ScriptedRunner> {
    let runner = Arc::new(ScriptedRunner::new());
    runner
        .on("mount", ok(MOUNT_TABLE_OS_ONLY))
        .on("parted -s /dev/sdb print", ok(PARTED_MSDOS))
        .on("sfdisk --part-type /dev/sdb 1", ok("83\n"));
    runner
}

#[test]
fn already_mounted_disk_is_left_alone_on_every_run() {
    let dir = tempfile::tempdir().unwrap();
    let existing = dir.path().join("existing");
    fs::create_dir_all(&existing).unwrap();

    let runner = Arc::new(ScriptedRunner::new());
    runner.on("mount", ok(&mount_table_with_resource(&existing)));
    let sink = Arc::new(RecordingSink::default());
    let handler = scripted_handler(config_in(dir.path()), runner.clone(), Some("sdb"), sink);

    let first = handler.activate_resource_disk().unwrap();
    let second = handler.activate_resource_disk().unwrap();

    assert_eq!(first.mount_point, existing);
    assert_eq!(second.mount_point, existing);
    assert!(first.already_mounted && second.already_mounted);
    assert_eq!(runner.count("parted"), 0);
    assert_eq!(runner.count("sfdisk"), 0);
    assert_eq!(runner.count("mkfs"), 0);
    assert_eq!(runner.count("mount /dev"), 0);
    assert_eq!(
        fs::read_to_string(existing.join(WARNING_FILE_NAME)).unwrap(),
        DATA_LOSS_WARNING
    );
}

#[test]
fn fresh_disk_is_mounted_at_configured_path_with_warning_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let target = config.mount_point.clone();

    let runner = fresh_disk_runner();
    let sink = Arc::new(RecordingSink::default());
    let handler = scripted_handler(config, runner.clone(), Some("sdb"), sink.clone());

    let outcome = handler.activate_resource_disk().unwrap();
    assert_eq!(outcome.mount_point, target);
    assert!(!outcome.already_mounted);
    assert!(target.is_dir());
    assert_eq!(
        fs::read_to_string(target.join(WARNING_FILE_NAME)).unwrap(),
        DATA_LOSS_WARNING
    );
    assert_eq!(
        runner.matching("mount /dev"),
        vec![format!("mount /dev/sdb1 {}", target.display())]
    );

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].op, EventOperation::ActivateResourceDisk);
    assert!(events[0].is_success);
}

#[test]
fn missing_device_is_reported_as_topology_failure() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new());
    let sink = Arc::new(RecordingSink::default());
    let handler = scripted_handler(config_in(dir.path()), runner.clone(), None, sink.clone());

    assert!(handler.activate_resource_disk().is_none());
    assert!(runner.calls().is_empty());

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "WALA");
    assert_eq!(events[0].op, EventOperation::ActivateResourceDisk);
    assert!(!events[0].is_success);
    assert_eq!(events[0].message, "unable to detect disk topology");
}

#[test]
fn unreadable_partition_table_aborts_before_mounting() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new());
    runner
        .on("mount", ok(MOUNT_TABLE_OS_ONLY))
        .on("parted", exit(1, "Error: Could not stat device /dev/sdb"));
    let sink = Arc::new(RecordingSink::default());
    let handler = scripted_handler(config_in(dir.path()), runner.clone(), Some("sdb"), sink.clone());

    assert!(handler.activate_resource_disk().is_none());
    assert_eq!(runner.count("mount /dev"), 0);
    assert!(sink.events()[0].message.contains("could not determine partition info"));
}

#[test]
fn missing_sfdisk_still_mounts_a_legacy_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let target = config.mount_point.clone();

    let runner = Arc::new(ScriptedRunner::new());
    runner
        .on("mount", ok(MOUNT_TABLE_OS_ONLY))
        .on("parted -s /dev/sdb print", ok(PARTED_MSDOS))
        .missing("sfdisk");
    let handler = scripted_handler(config, runner.clone(), Some("sdb"), Arc::default());

    let outcome = handler.activate_resource_disk().unwrap();
    assert_eq!(outcome.mount_point, target);
    assert_eq!(runner.count("mount /dev/sdb1"), 1);
}

#[test]
fn warning_file_failure_does_not_fail_activation() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    fs::create_dir_all(config.mount_point.join(WARNING_FILE_NAME)).unwrap();

    let handler = scripted_handler(
        config,
        fresh_disk_runner(),
        Some("sdb"),
        Arc::new(RecordingSink::default()),
    );
    assert!(handler.activate_resource_disk().is_some());
}

#[test]
fn run_does_nothing_when_formatting_is_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let config = ResourceDiskConfig {
        enable_formatting: false,
        enable_swap: true,
        swap_size_mb: 16,
        ..config_in(dir.path())
    };
    let runner = Arc::new(ScriptedRunner::new());
    let handler = scripted_handler(config, runner.clone(), Some("sdb"), Arc::default());

    let summary = handler.run();
    assert_eq!(summary.activation, None);
    assert_eq!(summary.swap, None);
    assert!(runner.calls().is_empty());
}

#[test]
fn run_enables_swap_on_the_new_mount() {
    let dir = tempfile::tempdir().unwrap();
    let config = ResourceDiskConfig {
        enable_swap: true,
        swap_size_mb: 1,
        ..config_in(dir.path())
    };
    let swap_path = config.mount_point.join("swapfile");

    let runner = fresh_disk_runner();
    let sink = Arc::new(RecordingSink::default());
    let handler = scripted_handler(config, runner.clone(), Some("sdb"), sink.clone());

    assert_eq!(handler.config().swap_size_mb, 1);

    let summary = handler.run();
    let swap = summary.swap.unwrap();
    assert_eq!(swap.path, swap_path);
    assert_eq!(swap.size_bytes, 1024 * 1024);
    assert_eq!(fs::metadata(&swap_path).unwrap().len(), 1024 * 1024);
    assert_eq!(runner.count(&format!("mkswap {}", swap_path.display())), 1);
    assert_eq!(runner.count(&format!("swapon {}", swap_path.display())), 1);

    let ops: Vec<_> = sink.events().iter().map(|event| event.op).collect();
    assert_eq!(
        ops,
        vec![EventOperation::ActivateResourceDisk, EventOperation::EnableSwap]
    );
}

#[test]
fn swap_failure_keeps_the_mount() {
    let dir = tempfile::tempdir().unwrap();
    let config = ResourceDiskConfig {
        enable_swap: true,
        swap_size_mb: 1,
        ..config_in(dir.path())
    };

    let runner = fresh_disk_runner();
    runner.on("mkswap", exit(1, "mkswap: swap area needs to be at least 40 KiB"));
    let sink = Arc::new(RecordingSink::default());
    let handler = scripted_handler(config, runner, Some("sdb"), sink.clone());

    let summary = handler.run();
    assert!(summary.activation.is_some());
    assert!(summary.swap.is_none());

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert!(events[0].is_success);
    assert_eq!(events[1].op, EventOperation::EnableSwap);
    assert!(!events[1].is_success);
}

#[test]
fn zero_swap_size_skips_swap() {
    let dir = tempfile::tempdir().unwrap();
    let config = ResourceDiskConfig {
        enable_swap: true,
        swap_size_mb: 0,
        ..config_in(dir.path())
    };

    let runner = fresh_disk_runner();
    let handler = scripted_handler(config, runner.clone(), Some("sdb"), Arc::default());

    let summary = handler.run();
    assert!(summary.activation.is_some());
    assert!(summary.swap.is_none());
    assert_eq!(runner.count("swapon"), 0);
}

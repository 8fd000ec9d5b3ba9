// SPDX-License-Identifier: GPL-3.0-only

//! Agent configuration file loading
//!
//! The file is the waagent-style flat `Key=Value` list. Keys outside any
//! section land in configparser's `default` section and are case-insensitive.

use std::path::{Path, PathBuf};

use configparser::ini::Ini;
use resdisk_types::{FilesystemType, ResourceDiskConfig};
use tracing::{debug, warn};

use crate::error::{ResourceDiskError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/waagent.conf";

const SECTION: &str = "default";

const KEY_FORMAT: &str = "resourcedisk.format";
const KEY_FILESYSTEM: &str = "resourcedisk.filesystem";
const KEY_MOUNT_POINT: &str = "resourcedisk.mountpoint";
const KEY_MOUNT_OPTIONS: &str = "resourcedisk.mountoptions";
const KEY_ENABLE_SWAP: &str = "resourcedisk.enableswap";
const KEY_SWAP_SIZE_MB: &str = "resourcedisk.swapsizemb";
const KEY_DEVICE: &str = "resourcedisk.device";
const KEY_EVENT_DIR: &str = "logs.eventdir";

/// Load configuration from `path`; a missing file yields the defaults
pub fn load_config(path: &Path) -> Result<ResourceDiskConfig> {
    if !path.exists() {
        warn!("Configuration file {:?} not found, using defaults", path);
        return Ok(ResourceDiskConfig::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| config_error(path, e))?;
    parse_config(&content).map_err(|reason| ResourceDiskError::Config {
        path: path.to_path_buf(),
        reason,
    })
}

/// Parse configuration text, falling back to defaults for absent keys
pub fn parse_config(content: &str) -> std::result::Result<ResourceDiskConfig, String> {
    let mut config = ResourceDiskConfig::default();
    if content.trim().is_empty() {
        return Ok(config);
    }

    let mut ini = Ini::new();
    ini.read(content.to_string())?;

    if let Some(value) = get_bool(&ini, KEY_FORMAT)? {
        config.enable_formatting = value;
    }
    if let Some(value) = get_bool(&ini, KEY_ENABLE_SWAP)? {
        config.enable_swap = value;
    }
    if let Some(value) = get_string(&ini, KEY_FILESYSTEM) {
        config.filesystem_type = FilesystemType::parse(&value);
    }
    if let Some(value) = get_string(&ini, KEY_MOUNT_POINT) {
        config.mount_point = PathBuf::from(value);
    }
    if let Some(value) = get_string(&ini, KEY_SWAP_SIZE_MB) {
        config.swap_size_mb = value
            .parse()
            .map_err(|e| format!("{KEY_SWAP_SIZE_MB}: invalid size {value:?}: {e}"))?;
    }
    config.mount_options = get_string(&ini, KEY_MOUNT_OPTIONS);
    config.device_override = get_string(&ini, KEY_DEVICE);
    config.event_dir = get_string(&ini, KEY_EVENT_DIR).map(PathBuf::from);

    debug!("Resolved configuration: {:?}", config);
    Ok(config)
}

// Empty values and the literal `None` both mean "not set".
fn get_string(ini: &Ini, key: &str) -> Option<String> {
    ini.get(SECTION, key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty() && value != "None")
}

fn get_bool(ini: &Ini, key: &str) -> std::result::Result<Option<bool>, String> {
    let Some(value) = get_string(ini, key) else {
        return Ok(None);
    };
    match value.to_lowercase().as_str() {
        "y" | "yes" | "true" | "on" | "1" => Ok(Some(true)),
        "n" | "no" | "false" | "off" | "0" => Ok(Some(false)),
        _ => Err(format!("{key}: expected y or n, got {value:?}")),
    }
}

fn config_error(path: &Path, reason: impl std::fmt::Display) -> ResourceDiskError {
    ResourceDiskError::Config {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use resdisk_types::FilesystemType;

    use super::{load_config, parse_config};

    const WAAGENT_CONF: &str = "\
#
# Microsoft Azure Linux Agent Configuration
#

# Format if unformatted. If 'n', resource disk will not be mounted.
ResourceDisk.Format=y

# File system on the resource disk
ResourceDisk.Filesystem=xfs

# Mount point for the resource disk
ResourceDisk.MountPoint=/mnt/resource

# Create and use swapfile on resource disk.
ResourceDisk.EnableSwap=y

# Size of the swapfile.
ResourceDisk.SwapSizeMB=2048

# Comma-separated list of mount options. See mount(8) for valid options.
ResourceDisk.MountOptions=None
";

    #[test]
    fn parses_waagent_resource_disk_keys() {
        let config = parse_config(WAAGENT_CONF).unwrap();
        assert!(config.enable_formatting);
        assert!(config.enable_swap);
        assert_eq!(config.filesystem_type, FilesystemType::Xfs);
        assert_eq!(config.mount_point, PathBuf::from("/mnt/resource"));
        assert_eq!(config.swap_size_mb, 2048);
        assert_eq!(config.mount_options, None);
    }

    #[test]
    fn keeps_mount_options_and_defaults() {
        let config = parse_config("ResourceDisk.MountOptions=nodev,nosuid\n").unwrap();
        assert_eq!(config.mount_options.as_deref(), Some("nodev,nosuid"));
        assert!(config.enable_formatting);
        assert!(!config.enable_swap);
        assert_eq!(config.filesystem_type, FilesystemType::Ext4);
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(parse_config("ResourceDisk.EnableSwap=maybe\n").is_err());
        assert!(parse_config("ResourceDisk.SwapSizeMB=-5\n").is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config(std::path::Path::new("/nonexistent/waagent.conf")).unwrap();
        assert_eq!(config, resdisk_types::ResourceDiskConfig::default());
    }
}

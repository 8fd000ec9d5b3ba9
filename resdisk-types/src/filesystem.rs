// SPDX-License-Identifier: GPL-3.0-only

//! Filesystem types the resource disk can be formatted with

use serde::{Deserialize, Serialize};

/// Filesystem requested for the resource disk partition
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilesystemType {
    #[default]
    Ext4,
    Ext3,
    Ext2,
    Xfs,
    Btrfs,
    Ntfs,
    /// Any other filesystem with a matching `mkfs.<name>` tool
    Other(String),
}

impl FilesystemType {
    /// Parse from a configured filesystem name
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "ext4" => Self::Ext4,
            "ext3" => Self::Ext3,
            "ext2" => Self::Ext2,
            "xfs" => Self::Xfs,
            "btrfs" => Self::Btrfs,
            "ntfs" => Self::Ntfs,
            other => Self::Other(other.to_string()),
        }
    }

    /// Name as understood by `mount -t` and the `mkfs.<name>` convention
    pub fn name(&self) -> &str {
        match self {
            Self::Ext4 => "ext4",
            Self::Ext3 => "ext3",
            Self::Ext2 => "ext2",
            Self::Xfs => "xfs",
            Self::Btrfs => "btrfs",
            Self::Ntfs => "ntfs",
            Self::Other(name) => name,
        }
    }

    /// Convert to mkfs command name
    pub fn mkfs_command(&self) -> String {
        format!("mkfs.{}", self.name())
    }

    /// Flag that makes the mkfs tool overwrite without asking.
    ///
    /// mkfs.xfs spells it lowercase; every other tool gets `-F`.
    pub fn force_flag(&self) -> &'static str {
        match self {
            Self::Xfs => "-f",
            _ => "-F",
        }
    }

    pub fn is_ntfs(&self) -> bool {
        matches!(self, Self::Ntfs)
    }
}

impl std::fmt::Display for FilesystemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

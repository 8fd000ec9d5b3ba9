// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

/// Partition table scheme reported by `parted print`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionTableKind {
    Gpt,
    /// MBR-style (`msdos`) or anything that is not GPT, including no label
    Legacy,
}

/// One numbered row of the partition listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionEntry {
    /// Partition number as reported by parted (1-based)
    pub index: u32,

    /// Remainder of the row (start, end, size, filesystem, name, flags)
    pub descriptor: String,
}

/// Snapshot of a device's partition table, recomputed on every run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionTableSnapshot {
    pub kind: PartitionTableKind,
    pub entries: Vec<PartitionEntry>,

    /// Raw type code of partition 1 on legacy tables (e.g. `7`, `83`)
    pub legacy_type_code: Option<String>,
}

impl PartitionTableSnapshot {
    pub fn is_gpt(&self) -> bool {
        self.kind == PartitionTableKind::Gpt
    }

    /// Partition numbers in the order parted listed them
    pub fn indices(&self) -> Vec<u32> {
        self.entries.iter().map(|entry| entry.index).collect()
    }
}

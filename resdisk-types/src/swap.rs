// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Convert a configured size in megabytes to bytes (size_mb * 1024 * 1024)
pub fn mb_to_bytes(size_mb: u64) -> u64 {
    size_mb.saturating_mul(1024 * 1024)
}

/// Observed state of the swap file relative to the desired size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapFileState {
    Absent,
    PresentMatchingSize,
    PresentMismatchedSize,
    /// Listed by `swapon` and exactly the desired size
    Active,
}

/// The single swap file kept at the root of the resource disk mount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapFileDescriptor {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub state: SwapFileState,
}

impl SwapFileDescriptor {
    pub fn is_active(&self) -> bool {
        self.state == SwapFileState::Active
    }
}

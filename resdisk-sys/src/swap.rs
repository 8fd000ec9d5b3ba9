// SPDX-License-Identifier: GPL-3.0-only

//! Swap file provisioning on the resource disk mount

use std::fs;
use std::path::{Path, PathBuf};

use resdisk_types::{SWAP_FILE_NAME, SwapFileDescriptor, SwapFileState, SwapOutcome, mb_to_bytes};
use tracing::{info, warn};

use crate::allocate::FileAllocator;
use crate::cmd::{CommandRunner, ToolCommand};
use crate::error::{ResourceDiskError, Result};

/// Whether `path` appears as a device/file in `swapon -s` output
pub fn swap_listing_contains(listing: &str, path: &Path) -> bool {
    let wanted = path.to_string_lossy();
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .any(|name| unescape_octal(name) == wanted)
}

// /proc/swaps writes space, tab, newline and backslash as `\ooo`.
fn unescape_octal(name: &str) -> String {
    let bytes = name.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_escape(&bytes[i + 1..i + 4]) {
            let value = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, digit| acc * 8 + u32::from(digit - b'0'));
            if let Ok(byte) = u8::try_from(value) {
                decoded.push(byte);
                i += 4;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits.len() == 3 && digits.iter().all(|digit| (b'0'..=b'7').contains(digit))
}

/// Keeps exactly one swap file of the configured size active on a mount
pub struct SwapFileProvisioner<'a> {
    runner: &'a dyn CommandRunner,
    allocator: FileAllocator<'a>,
}

impl<'a> SwapFileProvisioner<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self::with_allocator(runner, FileAllocator::new(runner))
    }

    pub fn with_allocator(runner: &'a dyn CommandRunner, allocator: FileAllocator<'a>) -> Self {
        Self { runner, allocator }
    }

    /// Observe the swap file without changing anything
    pub fn inspect(&self, mount_point: &Path, size_mb: u64) -> Result<SwapFileDescriptor> {
        let path = mount_point.join(SWAP_FILE_NAME);
        let size_bytes = mb_to_bytes(size_mb);
        let active = self.is_listed(&path)?;

        let state = match file_size(&path) {
            None => SwapFileState::Absent,
            Some(size) if size != size_bytes => SwapFileState::PresentMismatchedSize,
            Some(_) if active => SwapFileState::Active,
            Some(_) => SwapFileState::PresentMatchingSize,
        };

        Ok(SwapFileDescriptor {
            path,
            size_bytes,
            state,
        })
    }

    /// Converge to an active swap file of `size_mb` megabytes
    pub fn provision(&self, mount_point: &Path, size_mb: u64) -> Result<SwapOutcome> {
        let descriptor = self.inspect(mount_point, size_mb)?;
        let path = descriptor.path.clone();
        let size = descriptor.size_bytes;

        if descriptor.is_active() {
            info!("Swap already enabled");
            return Ok(SwapOutcome {
                path,
                size_bytes: size,
                unchanged: true,
            });
        }

        match descriptor.state {
            SwapFileState::PresentMismatchedSize => {
                info!("Remove old swap file");
                // Disables every swap area on the host, not only this file.
                let swapoff = ToolCommand::new("swapoff").arg("-a");
                match self.runner.run(&swapoff) {
                    Ok(0) => {}
                    Ok(status) => warn!("`{}` exited with {}", swapoff, status),
                    Err(e) => warn!("`{}` failed: {}", swapoff, e),
                }
                fs::remove_file(&path).map_err(|e| swap_error(&path, e))?;
                self.create(&path, size)?;
            }
            SwapFileState::Absent => self.create(&path, size)?,
            SwapFileState::PresentMatchingSize | SwapFileState::Active => {}
        }

        let swapon = ToolCommand::new("swapon").path_arg(&path);
        let output = self.runner.run_capture(&swapon).map_err(|e| swap_error(&path, e))?;
        if !output.success() {
            return Err(swap_error(&path, output.error_text()));
        }

        info!("Enabled {}KB of swap at {}", size / 1024, path.display());
        Ok(SwapOutcome {
            path,
            size_bytes: size,
            unchanged: false,
        })
    }

    fn create(&self, path: &Path, size: u64) -> Result<()> {
        info!("Create swap file");
        let nbytes = i64::try_from(size).map_err(|_| swap_error(path, "swap size too large"))?;
        self.allocator
            .allocate(path, nbytes)
            .map_err(|e| swap_error(path, e))?;

        let mkswap = ToolCommand::new("mkswap").path_arg(path);
        let output = self.runner.run_capture(&mkswap).map_err(|e| swap_error(path, e))?;
        if !output.success() {
            return Err(swap_error(path, output.error_text()));
        }
        Ok(())
    }

    fn is_listed(&self, path: &Path) -> Result<bool> {
        let output = self
            .runner
            .run_capture(&ToolCommand::new("swapon").arg("-s"))
            .map_err(|e| swap_error(path, e))?;
        if !output.success() {
            warn!("Could not list active swap: {}", output.error_text());
            return Ok(false);
        }
        Ok(swap_listing_contains(&output.stdout, path))
    }
}

fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(|metadata| metadata.is_file())
        .map(|metadata| metadata.len())
}

fn swap_error(path: &Path, reason: impl std::fmt::Display) -> ResourceDiskError {
    ResourceDiskError::Swap {
        path: PathBuf::from(path),
        reason: reason.to_string(),
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Non-sparse file preallocation
//!
//! [`FileAllocator`] tries an ordered list of [`AllocationStrategy`]s and stops
//! at the first one that succeeds:
//!
//! 1. `posix_fallocate(3)` on the open file
//! 2. the `fallocate` tool from util-linux
//! 3. zero-filling with `dd`, in copies of at most 64 MiB each
//!
//! Any existing file at the path is removed first, so the result always has
//! exactly the requested length.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use tracing::{debug, error, info};

use crate::cmd::{CommandRunner, OWNER_ONLY_UMASK, ToolCommand};
use crate::error::{ResourceDiskError, Result};

/// Largest single `dd` block (64 MiB)
pub const ZERO_FILL_MAX_BLOCK: u64 = 64 * 1024 * 1024;

/// Permissions of files created directly by the allocator
const OWNER_ONLY_MODE: u32 = 0o600;

/// One way of producing a fully allocated file of a given length
pub trait AllocationStrategy {
    fn name(&self) -> &'static str;

    /// Returns `Ok(false)` when this mechanism is unavailable or failed and the
    /// next strategy should be tried.
    fn allocate(&self, path: &Path, len: u64) -> Result<bool>;
}

/// `posix_fallocate(3)`; unsupported filesystems make it fall through silently
#[derive(Debug, Default)]
pub struct KernelPreallocate;

impl AllocationStrategy for KernelPreallocate {
    fn name(&self) -> &'static str {
        "posix_fallocate"
    }

    fn allocate(&self, path: &Path, len: u64) -> Result<bool> {
        let Ok(len) = libc::off_t::try_from(len) else {
            return Ok(false);
        };
        let file = match OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(OWNER_ONLY_MODE)
            .open(path)
        {
            Ok(file) => file,
            Err(e) => {
                debug!("Could not open {:?} for preallocation: {}", path, e);
                return Ok(false);
            }
        };

        // posix_fallocate returns the error number instead of setting errno.
        let rc = unsafe { libc::posix_fallocate(file.as_raw_fd(), 0, len) };
        if rc == 0 {
            return Ok(true);
        }
        debug!(
            "posix_fallocate on {:?} failed: {}",
            path,
            std::io::Error::from_raw_os_error(rc)
        );
        Ok(false)
    }
}

/// `umask 0077 && fallocate -l <len> <path>`
pub struct FallocateTool<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> FallocateTool<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }
}

impl AllocationStrategy for FallocateTool<'_> {
    fn name(&self) -> &'static str {
        "fallocate"
    }

    fn allocate(&self, path: &Path, len: u64) -> Result<bool> {
        let command = ToolCommand::new("fallocate")
            .arg("-l")
            .arg(len.to_string())
            .path_arg(path)
            .with_umask(OWNER_ONLY_UMASK);
        match self.runner.run(&command) {
            Ok(0) => Ok(true),
            Ok(status) => {
                info!("fallocate unsuccessful (exit {}), falling back to dd", status);
                Ok(false)
            }
            Err(e) => {
                info!("fallocate unavailable ({}), falling back to dd", e);
                Ok(false)
            }
        }
    }
}

/// How a zero-fill splits the target length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroFillPlan {
    pub block_size: u64,
    pub whole_blocks: u64,

    /// Bytes left after the whole blocks, always smaller than `block_size`
    pub remainder: u64,
}

impl ZeroFillPlan {
    pub fn new(len: u64) -> Self {
        Self {
            block_size: ZERO_FILL_MAX_BLOCK,
            whole_blocks: len / ZERO_FILL_MAX_BLOCK,
            remainder: len % ZERO_FILL_MAX_BLOCK,
        }
    }

    /// Byte offset at which the remainder chunk is written
    pub fn remainder_offset(&self) -> u64 {
        self.whole_blocks * self.block_size
    }

    /// The `dd` invocations, in order: whole blocks first, then the remainder
    pub fn commands(&self, path: &Path) -> Vec<ToolCommand> {
        let mut commands = Vec::new();
        if self.whole_blocks > 0 {
            commands.push(
                dd_base(self.block_size, self.whole_blocks)
                    .arg(format!("of={}", path.display()))
                    .with_umask(OWNER_ONLY_UMASK),
            );
        }
        if self.remainder > 0 {
            commands.push(
                dd_base(self.remainder, 1)
                    .arg("oflag=seek_bytes")
                    .arg(format!("seek={}", self.remainder_offset()))
                    .arg(format!("of={}", path.display()))
                    .with_umask(OWNER_ONLY_UMASK),
            );
        }
        commands
    }
}

fn dd_base(block_size: u64, count: u64) -> ToolCommand {
    ToolCommand::new("dd")
        .arg("if=/dev/zero")
        .arg(format!("bs={block_size}"))
        .arg(format!("count={count}"))
        .arg("conv=notrunc")
}

/// Chunked `dd if=/dev/zero` copy, bounding each write to 64 MiB
pub struct ZeroFillCopy<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> ZeroFillCopy<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }
}

impl AllocationStrategy for ZeroFillCopy<'_> {
    fn name(&self) -> &'static str {
        "dd"
    }

    fn allocate(&self, path: &Path, len: u64) -> Result<bool> {
        let mut ok = true;
        // Both halves run even if the first fails; success needs both.
        for command in ZeroFillPlan::new(len).commands(path) {
            match self.runner.run(&command) {
                Ok(0) => {}
                Ok(status) => {
                    error!("`{}` exited with {}", command, status);
                    ok = false;
                }
                Err(e) => {
                    error!("`{}` failed: {}", command, e);
                    ok = false;
                }
            }
        }

        if ok {
            info!("dd successful");
        } else {
            error!("dd unsuccessful");
        }
        Ok(ok)
    }
}

/// Produces non-sparse files of an exact size, replacing existing files
pub struct FileAllocator<'a> {
    strategies: Vec<Box<dyn AllocationStrategy + 'a>>,
}

impl<'a> FileAllocator<'a> {
    /// The standard chain: kernel call, then `fallocate`, then `dd`
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self::with_strategies(vec![
            Box::new(KernelPreallocate),
            Box::new(FallocateTool::new(runner)),
            Box::new(ZeroFillCopy::new(runner)),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn AllocationStrategy + 'a>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|strategy| strategy.name()).collect()
    }

    /// Create `path` with exactly `nbytes` allocated bytes
    ///
    /// A negative size is rejected before the filesystem is touched.
    pub fn allocate(&self, path: &Path, nbytes: i64) -> Result<()> {
        let len = u64::try_from(nbytes).map_err(|_| ResourceDiskError::InvalidSize(nbytes))?;

        match fs::remove_file(path) {
            Ok(()) => debug!("Removed existing {:?}", path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if len == 0 {
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(OWNER_ONLY_MODE)
                .open(path)?;
            return Ok(());
        }

        for strategy in &self.strategies {
            debug!("Allocating {} bytes at {:?} with {}", len, path, strategy.name());
            match strategy.allocate(path, len) {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => debug!("{} failed: {}", strategy.name(), e),
            }
        }

        Err(ResourceDiskError::Allocation {
            path: path.to_path_buf(),
            size: len,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::Path;

    use super::{AllocationStrategy, FileAllocator, KernelPreallocate, ZeroFillPlan};
    use crate::error::{ResourceDiskError, Result};

    const MIB: u64 = 1024 * 1024;

    struct Recording<'a> {
        name: &'static str,
        succeeds: bool,
        calls: &'a RefCell<Vec<&'static str>>,
    }

    impl AllocationStrategy for Recording<'_> {
        fn name(&self) -> &'static str {
            self.name
        }

        fn allocate(&self, _path: &Path, _len: u64) -> Result<bool> {
            self.calls.borrow_mut().push(self.name);
            Ok(self.succeeds)
        }
    }

    #[test]
    fn splits_200_mib_into_three_blocks_and_remainder() {
        let plan = ZeroFillPlan::new(200 * MIB);
        assert_eq!(plan.block_size, 64 * MIB);
        assert_eq!(plan.whole_blocks, 3);
        assert_eq!(plan.remainder, 8 * MIB);
        assert_eq!(plan.whole_blocks * plan.block_size + plan.remainder, 200 * MIB);

        let commands = plan.commands(Path::new("/mnt/resource/swapfile"));
        assert_eq!(commands.len(), 2);
        assert_eq!(
            commands[0].render(),
            "umask 0077 && dd if=/dev/zero bs=67108864 count=3 conv=notrunc of=/mnt/resource/swapfile"
        );
        assert_eq!(
            commands[1].render(),
            "umask 0077 && dd if=/dev/zero bs=8388608 count=1 conv=notrunc oflag=seek_bytes seek=201326592 of=/mnt/resource/swapfile"
        );
    }

    #[test]
    fn small_sizes_need_only_the_remainder_copy() {
        let plan = ZeroFillPlan::new(5 * MIB);
        assert_eq!(plan.whole_blocks, 0);
        assert_eq!(plan.commands(Path::new("/tmp/f")).len(), 1);

        let exact = ZeroFillPlan::new(128 * MIB);
        assert_eq!(exact.remainder, 0);
        assert_eq!(exact.commands(Path::new("/tmp/f")).len(), 1);
    }

    #[test]
    fn stops_at_first_successful_strategy() {
        let calls = RefCell::new(Vec::new());
        let dir = tempfile::tempdir().unwrap();
        let allocator = FileAllocator::with_strategies(vec![
            Box::new(Recording { name: "first", succeeds: false, calls: &calls }),
            Box::new(Recording { name: "second", succeeds: true, calls: &calls }),
            Box::new(Recording { name: "third", succeeds: true, calls: &calls }),
        ]);

        allocator.allocate(&dir.path().join("f"), 4096).unwrap();
        assert_eq!(*calls.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn reports_failure_when_every_strategy_fails() {
        let calls = RefCell::new(Vec::new());
        let dir = tempfile::tempdir().unwrap();
        let allocator = FileAllocator::with_strategies(vec![
            Box::new(Recording { name: "a", succeeds: false, calls: &calls }),
            Box::new(Recording { name: "b", succeeds: false, calls: &calls }),
        ]);

        let err = allocator.allocate(&dir.path().join("f"), 4096).unwrap_err();
        assert!(matches!(err, ResourceDiskError::Allocation { size: 4096, .. }));
    }

    #[test]
    fn negative_size_fails_before_touching_the_filesystem() {
        let calls = RefCell::new(Vec::new());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keep");
        std::fs::write(&path, b"existing").unwrap();

        let allocator = FileAllocator::with_strategies(vec![Box::new(Recording {
            name: "never",
            succeeds: true,
            calls: &calls,
        })]);

        let err = allocator.allocate(&path, -1).unwrap_err();
        assert!(matches!(err, ResourceDiskError::InvalidSize(-1)));
        assert!(calls.borrow().is_empty());
        assert_eq!(std::fs::read(&path).unwrap(), b"existing");
    }

    #[test]
    fn kernel_preallocation_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swapfile");
        std::fs::write(&path, vec![0xAAu8; 3 * 4096]).unwrap();

        let allocator = FileAllocator::with_strategies(vec![Box::new(KernelPreallocate)]);
        allocator.allocate(&path, 8192).unwrap();

        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents.len(), 8192);
        assert!(contents.iter().all(|byte| *byte == 0));
    }

    #[test]
    fn zero_length_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"old").unwrap();

        let allocator = FileAllocator::with_strategies(Vec::new());
        allocator.allocate(&path, 0).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }
}

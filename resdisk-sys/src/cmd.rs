// SPDX-License-Identifier: GPL-3.0-only

//! External tool invocation
//!
//! Every disk, mount and swap operation goes through [`CommandRunner`], so the
//! whole activation flow can be driven by a scripted runner in tests.

use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;

use nix::sys::stat::{Mode, umask};
use tracing::debug;

use crate::error::{ResourceDiskError, Result};

/// Owner-only file creation mask used for swap file allocation tools
pub const OWNER_ONLY_UMASK: u32 = 0o077;

/// A single external tool invocation, passed to the OS as an argv vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub umask: Option<u32>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            umask: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &std::path::Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Apply a file creation mask in the child before exec
    pub fn with_umask(mut self, mask: u32) -> Self {
        self.umask = Some(mask);
        self
    }

    /// Shell-like rendering used for logs, errors and test matching
    pub fn render(&self) -> String {
        let mut rendered = String::new();
        if let Some(mask) = self.umask {
            rendered.push_str(&format!("umask {mask:04o} && "));
        }
        rendered.push_str(&quote(&self.program));
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(&quote(arg));
        }
        rendered
    }
}

impl std::fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

fn quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=%:,+@".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

/// Captured result of a finished tool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `-1` when the child was killed by a signal
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Best available error text: stderr, else stdout, else the exit code
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        format!("exit status {}", self.status)
    }
}

/// Runs external tools; implementations must be usable from a background thread
pub trait CommandRunner: Send + Sync {
    fn run_capture(&self, command: &ToolCommand) -> Result<CommandOutput>;

    fn run(&self, command: &ToolCommand) -> Result<i32> {
        self.run_capture(command).map(|output| output.status)
    }
}

/// Runs tools on the host with `std::process::Command`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run_capture(&self, command: &ToolCommand) -> Result<CommandOutput> {
        let rendered = command.render();
        debug!("Running {}", rendered);

        let mut process = Command::new(&command.program);
        process.args(&command.args);
        if let Some(mask) = command.umask {
            let mode = Mode::from_bits_truncate(mask);
            // umask(2) is async-signal-safe and cannot fail.
            unsafe {
                process.pre_exec(move || {
                    umask(mode);
                    Ok(())
                });
            }
        }

        let output = process
            .output()
            .map_err(|source| ResourceDiskError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        let result = CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        debug!("{} exited with {}", rendered, result.status);
        Ok(result)
    }
}

/// Locate a tool on `PATH`
pub fn require_tool(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

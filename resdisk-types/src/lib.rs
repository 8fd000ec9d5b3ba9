// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for resource disk activation
//!
//! This crate defines the types shared by the activation library and the agent
//! binary:
//!
//! - **resdisk-sys**: Produces these types while reconciling the live disk state
//! - **resdisk-agent**: Serializes them as JSON for operators and event files
//!
//! Nothing here touches the system. Every value is re-derived from the live
//! machine on each activation run; no state is persisted between runs.

pub mod config;
pub mod event;
pub mod filesystem;
pub mod outcome;
pub mod partition;
pub mod swap;

pub use config::{
    DEFAULT_FILESYSTEM, DEFAULT_MOUNT_POINT, ResourceDiskConfig, SWAP_FILE_NAME,
    WARNING_FILE_NAME,
};
pub use event::{ActivationEvent, EventOperation};
pub use filesystem::FilesystemType;
pub use outcome::{ActivationOutcome, InspectReport, RunSummary, SwapOutcome};
pub use partition::{PartitionEntry, PartitionTableKind, PartitionTableSnapshot};
pub use swap::{SwapFileDescriptor, SwapFileState, mb_to_bytes};

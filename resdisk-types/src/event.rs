// SPDX-License-Identifier: GPL-3.0-only

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operation an activation event reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventOperation {
    ActivateResourceDisk,
    EnableSwap,
}

impl std::fmt::Display for EventOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventOperation::ActivateResourceDisk => write!(f, "ActivateResourceDisk"),
            EventOperation::EnableSwap => write!(f, "EnableSwap"),
        }
    }
}

/// Fire-and-forget telemetry record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationEvent {
    pub name: String,
    pub op: EventOperation,
    pub is_success: bool,
    pub message: String,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl ActivationEvent {
    pub const AGENT_NAME: &'static str = "WALA";

    pub fn new(op: EventOperation, is_success: bool, message: impl Into<String>) -> Self {
        Self {
            name: Self::AGENT_NAME.to_string(),
            op,
            is_success,
            message: message.into(),
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

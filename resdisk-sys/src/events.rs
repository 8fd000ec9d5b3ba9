// SPDX-License-Identifier: GPL-3.0-only

//! Activation telemetry
//!
//! Sinks are fire-and-forget: a sink that cannot deliver an event logs and
//! moves on, it never changes the activation outcome.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use resdisk_types::ActivationEvent;
use tracing::{info, warn};

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ActivationEvent);
}

/// Records events in the log only
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &ActivationEvent) {
        info!(
            name = %event.name,
            op = %event.op,
            is_success = event.is_success,
            duration_ms = event.duration_ms,
            "event: {}",
            event.message
        );
    }
}

/// Writes each event as `<unix-nanos>.json` into a directory
#[derive(Debug, Clone)]
pub struct EventDirSink {
    dir: PathBuf,
}

impl EventDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn write(&self, event: &ActivationEvent) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let stamp = event
            .timestamp
            .timestamp_nanos_opt()
            .unwrap_or_else(|| event.timestamp.timestamp_micros() * 1000);
        let path = self.dir.join(format!("{stamp}.json"));
        let json = serde_json::to_string_pretty(event).map_err(std::io::Error::other)?;
        fs::write(&path, json)?;
        Ok(path)
    }
}

impl EventSink for EventDirSink {
    fn emit(&self, event: &ActivationEvent) {
        if let Err(e) = self.write(event) {
            warn!("Failed to write event to {:?}: {}", self.dir, e);
        }
    }
}

/// Delivers every event to each inner sink in order
#[derive(Clone, Default)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

impl EventSink for MultiSink {
    fn emit(&self, event: &ActivationEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

// src/pipeline/sinks.rs
//
// Outputs the engine hands work to: the haptic motor and the result store.

use crate::pipeline::feedback::HapticPulse;
use crate::types::SessionResult;
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Fire-and-forget vibration output. Called from the feedback task, never
/// from the detection path.
pub trait HapticSink: Send + Sync {
    fn pulse(&self, pulse: &HapticPulse);
}

pub trait ResultSink {
    fn persist(&self, result: &SessionResult) -> Result<()>;
}

/// Headless stand-in for a vibration motor: logs each pulse.
#[derive(Debug, Default)]
pub struct LogHapticSink;

impl HapticSink for LogHapticSink {
    fn pulse(&self, pulse: &HapticPulse) {
        info!(
            "📳 {:?} pulse {}ms: {}",
            pulse.kind, pulse.duration_ms, pulse.message
        );
    }
}

/// Appends one JSON line per result.
pub struct JsonlResultSink {
    path: PathBuf,
}

impl JsonlResultSink {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating result dir {}", parent.display()))?;
        }
        Ok(Self { path })
    }

    /// `<dir>/results_<UTC timestamp>.jsonl`
    pub fn timestamped(dir: impl AsRef<Path>) -> Result<Self> {
        let name = format!("results_{}.jsonl", chrono::Utc::now().format("%Y%m%d_%H%M%S"));
        Self::new(dir.as_ref().join(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for JsonlResultSink {
    fn persist(&self, result: &SessionResult) -> Result<()> {
        let line = serde_json::to_string(result)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        writeln!(file, "{line}")?;
        info!(
            "💾 Result {} saved to {}",
            result.session_id,
            self.path.display()
        );
        Ok(())
    }
}

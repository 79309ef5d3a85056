use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level configuration structure for the client runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
}

impl SyncConfig {
    /// Reads a JSON configuration file. Missing sections fall back to their
    /// defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Behaviour knobs for [`TimelineCoordinator`](crate::TimelineCoordinator).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Frame period used by hosts that drive the clock from a timer.
    pub frame_interval_ms: u64,
    /// Evaluate a freshly registered timeline against the current position
    /// right away instead of waiting for the next frame or seek.
    pub evaluate_on_register: bool,
    /// Emit `Leave` for every still-active event when its timeline is
    /// unregistered.
    pub leave_on_unregister: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
            evaluate_on_register: false,
            leave_on_unregister: true,
        }
    }
}

/// Configuration for the behaviour-event tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub flush_interval_ms: u64,
    /// Buffer length that triggers an immediate flush.
    pub max_buffer: usize,
    /// Upper bound on events kept around after failed flushes.
    pub retry_cap: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 10_000,
            max_buffer: 50,
            retry_cap: 200,
        }
    }
}

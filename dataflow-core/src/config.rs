//! Engine Configuration
//!
//! Tunables for scheduling and for the wait-and-retry loop used by streaming
//! and interpreter-driven modules. Every field has a default, so a config
//! file only needs to name what it overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which scheduler the controller uses for a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    /// Kahn's algorithm with insertion-order tie-breaking.
    #[default]
    Serial,
    /// Dependency levels, flattened level by level.
    Leveled,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerKind,
    /// Wait between polls of a streaming queue or interpreter.
    pub poll_interval_ms: u64,
    /// Polls before giving up with a warning.
    pub max_poll_retries: usize,
    /// Log each module's wall-clock duration at debug level.
    pub log_module_timings: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerKind::Serial,
            poll_interval_ms: 10,
            max_poll_retries: 100,
            log_module_timings: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

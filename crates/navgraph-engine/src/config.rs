//! Engine configuration: timeouts, wait handling, and cascade behavior.
//!
//! Loaded from a JSON file (every field optional) and then overridden from
//! `NAVGRAPH_*` environment variables.

use std::path::Path;
use std::time::Duration;

use navgraph_types::Result;
use serde::{Deserialize, Serialize};

use crate::graph::DEFAULT_HOME_IDS;

/// Environment variable overriding [`EngineConfig::action_timeout_ms`].
pub const ENV_ACTION_TIMEOUT_MS: &str = "NAVGRAPH_ACTION_TIMEOUT_MS";
/// Environment variable overriding [`EngineConfig::honor_wait_times`].
pub const ENV_HONOR_WAIT_TIMES: &str = "NAVGRAPH_HONOR_WAIT_TIMES";

/// Which descendants are aborted when a node fails validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadePolicy {
    /// Every transitive successor of the failed node that has not yet reached
    /// a terminal status.
    #[default]
    AllDescendants,
    /// Only descendants that can no longer be reached from any entry point
    /// once the failed nodes are removed.
    DisconnectedOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound for a single action sent to the device.
    pub action_timeout_ms: u64,
    /// When false, `waitTimeMs` / `finalWaitTimeMs` are ignored (dry runs).
    pub honor_wait_times: bool,
    pub cascade: CascadePolicy,
    /// Node ids recognized as the home screen when no node carries the root
    /// flag or a `home` label.
    pub home_ids: Vec<String>,
    /// Capacity of the progress event channel.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            action_timeout_ms: 30_000,
            honor_wait_times: true,
            cascade: CascadePolicy::default(),
            home_ids: DEFAULT_HOME_IDS.iter().map(|s| s.to_string()).collect(),
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Apply `NAVGRAPH_*` environment overrides. Unparseable values are
    /// logged and ignored.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(ENV_ACTION_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.action_timeout_ms = ms,
                Err(_) => tracing::warn!(var = ENV_ACTION_TIMEOUT_MS, value = %raw, "Ignoring invalid override"),
            }
        }
        if let Some(raw) = lookup(ENV_HONOR_WAIT_TIMES) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.honor_wait_times = true,
                "0" | "false" | "no" => self.honor_wait_times = false,
                _ => tracing::warn!(var = ENV_HONOR_WAIT_TIMES, value = %raw, "Ignoring invalid override"),
            }
        }
        self
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    /// Config for simulated runs: no waits, short timeout.
    pub fn dry_run() -> Self {
        Self {
            action_timeout_ms: 1_000,
            honor_wait_times: false,
            ..Self::default()
        }
    }
}

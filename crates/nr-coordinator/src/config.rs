//! Coordinator tuning.

use chrono::TimeDelta;
use nr_core::DEFAULT_HISTORY_CAPACITY;
use serde::Deserialize;
use serde::Serialize;

/// Declarative network ruleset toggled with the enabled flag.
pub const DEFAULT_RULESET_ID: &str = "redirect_blocker_rules";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Baselines idle longer than this are evicted by the sweep.
    pub baseline_idle_secs: u64,
    pub sweep_interval_secs: u64,
    pub history_capacity: usize,
    pub ruleset_id: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            baseline_idle_secs: 600,
            sweep_interval_secs: 300,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            ruleset_id: DEFAULT_RULESET_ID.to_owned(),
        }
    }
}

impl CoordinatorConfig {
    pub fn baseline_idle(&self) -> TimeDelta {
        seconds(self.baseline_idle_secs)
    }

    pub fn sweep_interval(&self) -> TimeDelta {
        seconds(self.sweep_interval_secs)
    }
}

fn seconds(value: u64) -> TimeDelta {
    i64::try_from(value)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

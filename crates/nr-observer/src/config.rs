//! Tuning for the page-isolated guards.

use chrono::TimeDelta;
use serde::Deserialize;
use serde::Serialize;

/// Sandbox tokens forced onto third-party frames: scripts, forms and
/// same-origin access, nothing that reaches the top level or opens popups.
pub const SAFE_SANDBOX_TOKENS: &[&str] = &["allow-scripts", "allow-forms", "allow-same-origin"];

/// Query keys whose value is treated as the real destination of a link.
pub const REDIRECT_PARAM_KEYS: &[&str] = &[
    "redirect",
    "redir",
    "url",
    "goto",
    "next",
    "return",
    "continue",
    "dest",
    "destination",
    "target",
    "link",
    "out",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Mutations arriving within this window are processed in one pass.
    pub batch_window_ms: u64,
    /// Overlay memo lifetime.
    pub overlay_cache_clear_secs: u64,
    /// Stacking order above this counts as extreme.
    pub overlay_z_index_threshold: i64,
    /// The maximal 32-bit stacking order ad overlays like to use.
    pub max_z_index: i64,
    pub safe_sandbox: Vec<String>,
    pub redirect_param_keys: Vec<String>,
    /// Also scan the children of directly inserted children.
    pub scan_grandchildren: bool,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            batch_window_ms: 5,
            overlay_cache_clear_secs: 30,
            overlay_z_index_threshold: 100_000,
            max_z_index: 2_147_483_647,
            safe_sandbox: SAFE_SANDBOX_TOKENS.iter().map(|token| (*token).to_owned()).collect(),
            redirect_param_keys: REDIRECT_PARAM_KEYS
                .iter()
                .map(|key| (*key).to_owned())
                .collect(),
            scan_grandchildren: true,
        }
    }
}

impl ObserverConfig {
    pub fn batch_window(&self) -> TimeDelta {
        i64::try_from(self.batch_window_ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .unwrap_or(TimeDelta::MAX)
    }

    pub fn overlay_cache_period(&self) -> TimeDelta {
        i64::try_from(self.overlay_cache_clear_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    /// Safe sandbox as an attribute value.
    pub fn safe_sandbox_value(&self) -> String {
        self.safe_sandbox.join(" ")
    }

    pub fn is_redirect_param(&self, key: &str) -> bool {
        self.redirect_param_keys
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(key))
    }

    pub fn is_extreme_z_index(&self, z_index: i64) -> bool {
        z_index == self.max_z_index || z_index > self.overlay_z_index_threshold
    }
}

//! TOML configuration for the headless host.

use nr_classifier::PatternTable;
use nr_coordinator::CoordinatorConfig;
use nr_core::GuardError;
use nr_core::GuardResult;
use nr_js::JsRuntimeConfig;
use nr_observer::ObserverConfig;
use nr_storage::StorageConfig;
use serde::Deserialize;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

/// Read from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "noredirect.toml";
pub const STORAGE_DIR_ENV: &str = "NOREDIRECT_STORAGE_DIR";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    /// Suspicious lexical patterns, matched case-insensitively.
    pub patterns: PatternTable,
    pub observer: ObserverConfig,
    pub coordinator: CoordinatorConfig,
    pub storage: StorageConfig,
    pub js: JsRuntimeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_owned(),
        }
    }
}

impl LoggingConfig {
    pub fn max_level(&self) -> GuardResult<Level> {
        Level::from_str(self.level.trim()).map_err(|_| {
            GuardError::new(
                "config.log_level_invalid",
                format!(
                    "unsupported log level `{}` (expected: trace|debug|info|warn|error)",
                    self.level
                ),
            )
        })
    }
}

impl AppConfig {
    /// Loads `path`, or `noredirect.toml` when present, or the defaults.
    pub fn load(path: Option<&Path>) -> GuardResult<Self> {
        match path {
            Some(path) => Self::read(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::read(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn read(path: &Path) -> GuardResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|error| {
            GuardError::new(
                "config.read_failed",
                format!("failed reading config `{}`: {error}", path.display()),
            )
        })?;
        Self::parse(&text).map_err(|error| {
            GuardError::new(
                "config.parse_failed",
                format!("config `{}` is invalid: {}", path.display(), error.message),
            )
        })
    }

    pub fn parse(text: &str) -> GuardResult<Self> {
        toml::from_str(text)
            .map_err(|error| GuardError::new("config.parse_failed", error.to_string()))
    }

    /// Storage the host opens. `--ephemeral` wins, then the environment
    /// override, then the config file, then `.noredirect` in the working
    /// directory.
    pub fn storage_for(&self, ephemeral: bool) -> StorageConfig {
        if ephemeral {
            return StorageConfig::ephemeral();
        }
        if let Some(root) = std::env::var_os(STORAGE_DIR_ENV) {
            return StorageConfig::with_root(PathBuf::from(root));
        }
        if self.storage.ephemeral_mode || self.storage.persistent_root.is_some() {
            return self.storage.clone();
        }
        StorageConfig::with_root(default_storage_root())
    }
}

fn default_storage_root() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".noredirect")
}

#[cfg(test)]
mod tests {
    use super::AppConfig;
    use tracing::Level;

    #[test]
    fn empty_file_means_defaults() {
        let config = AppConfig::parse("").unwrap_or_else(|_| unreachable!());
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.coordinator.history_capacity, 50);
        assert_eq!(config.observer.batch_window_ms, 5);
        assert!(config.patterns.matches("https://x.test/redirect"));
    }

    #[test]
    fn sections_override_defaults() {
        let config = AppConfig::parse(
            r#"
patterns = ["promo"]

[logging]
level = "debug"

[coordinator]
history_capacity = 10
ruleset_id = "custom_rules"

[storage]
ephemeral_mode = true
"#,
        )
        .unwrap_or_else(|_| unreachable!());

        assert_eq!(config.logging.max_level(), Ok(Level::DEBUG));
        assert_eq!(config.coordinator.history_capacity, 10);
        assert_eq!(config.coordinator.baseline_idle_secs, 600);
        assert!(config.patterns.matches("https://shop.test/PROMO"));
        assert!(!config.patterns.matches("https://shop.test/redirect"));
        assert!(config.storage_for(false).ephemeral_mode);
    }

    #[test]
    fn bad_pattern_is_a_config_error() {
        assert!(AppConfig::parse(r#"patterns = ["(unclosed"]"#).is_err());
    }

    #[test]
    fn unknown_level_is_rejected() {
        let config = AppConfig::parse("[logging]\nlevel = \"loud\"\n")
            .unwrap_or_else(|_| unreachable!());
        assert!(config.logging.max_level().is_err());
    }

    #[test]
    fn ephemeral_flag_wins() {
        let config = AppConfig::default();
        let storage = config.storage_for(true);
        assert!(storage.ephemeral_mode);
        assert!(storage.persistent_root.is_none());
    }
}

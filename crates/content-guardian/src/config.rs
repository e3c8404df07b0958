//! Configuration management for content-guardian.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tree::Selector;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "content-guardian";

/// Default rules file name.
const RULES_FILE_NAME: &str = "rules.json";

/// Environment variable prefix.
const ENV_PREFIX: &str = "CONTENT_GUARDIAN_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `CONTENT_GUARDIAN_`, `__` between sections)
/// 2. TOML config file at `~/.config/content-guardian/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine timing configuration.
    pub engine: EngineConfig,
    /// Container resolution configuration.
    pub container: ContainerConfig,
    /// Rule source configuration.
    pub rules: RulesConfig,
    /// User-defined platform profiles.
    pub profiles: Vec<ProfileConfig>,
}

/// Engine timing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Quiet period after the last structural change before a scan runs.
    pub scan_debounce_ms: u64,
    /// Interval between checks for the document root.
    pub host_poll_interval_ms: u64,
    /// Give up waiting for the document root after this long.
    /// Set to 0 to wait indefinitely.
    pub host_wait_timeout_ms: u64,
}

/// Container resolution configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Ancestor levels examined by the size heuristic.
    pub max_depth: usize,
    /// An ancestor taller than this is a content block.
    pub min_height: f64,
    /// An ancestor wider than this is a content block.
    pub min_width: f64,
}

/// Rule source configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Path to the rules file.
    /// Defaults to `~/.local/share/content-guardian/rules.json`
    pub path: Option<PathBuf>,
    /// Interval between rules file change checks in milliseconds.
    pub poll_interval_ms: u64,
}

/// A user-defined platform profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Profile name, also used as the site tag.
    pub name: String,
    /// Regex matched against the normalized host name.
    pub host_pattern: String,
    /// Selectors appended when the profile applies.
    pub selectors: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_debounce_ms: 100,
            host_poll_interval_ms: 50,
            host_wait_timeout_ms: 10_000,
        }
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            min_height: 50.0,
            min_width: 100.0,
        }
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: None, // Will be resolved to default at runtime
            poll_interval_ms: 1_000,
        }
    }
}

impl EngineConfig {
    /// Get the scan debounce delay as a Duration.
    #[must_use]
    pub fn scan_debounce(&self) -> Duration {
        Duration::from_millis(self.scan_debounce_ms)
    }

    /// Get the host poll interval as a Duration.
    #[must_use]
    pub fn host_poll_interval(&self) -> Duration {
        Duration::from_millis(self.host_poll_interval_ms)
    }

    /// Get the host wait timeout, or `None` to wait indefinitely.
    #[must_use]
    pub fn host_wait_timeout(&self) -> Option<Duration> {
        if self.host_wait_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.host_wait_timeout_ms))
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load and validate configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config = Self::load_unvalidated(config_path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration without validating it, for inspecting a broken file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_unvalidated(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        Ok(figment.extract()?)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.engine.scan_debounce_ms == 0 {
            return Err(Error::config_validation(
                "scan_debounce_ms must be greater than 0",
            ));
        }

        if self.engine.host_poll_interval_ms == 0 {
            return Err(Error::config_validation(
                "host_poll_interval_ms must be greater than 0",
            ));
        }

        if self.rules.poll_interval_ms == 0 {
            return Err(Error::config_validation(
                "rules.poll_interval_ms must be greater than 0",
            ));
        }

        if self.container.max_depth == 0 {
            return Err(Error::config_validation(
                "container.max_depth must be greater than 0",
            ));
        }

        if self.container.min_height < 0.0 || self.container.min_width < 0.0 {
            return Err(Error::config_validation(format!(
                "container size thresholds cannot be negative (min_height {}, min_width {})",
                self.container.min_height, self.container.min_width
            )));
        }

        for profile in &self.profiles {
            if profile.name.trim().is_empty() {
                return Err(Error::config_validation("profile name cannot be empty"));
            }
            if regex::Regex::new(&profile.host_pattern).is_err() {
                return Err(Error::config_validation(format!(
                    "invalid regex pattern for profile '{}': {}",
                    profile.name, profile.host_pattern
                )));
            }
            for selector in &profile.selectors {
                if let Err(e) = Selector::parse(selector) {
                    return Err(Error::config_validation(format!(
                        "profile '{}': {e}",
                        profile.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Get the rules file path, resolving defaults if not set.
    #[must_use]
    pub fn rules_path(&self) -> PathBuf {
        self.rules
            .path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(RULES_FILE_NAME))
    }

    /// Get the rules poll interval as a Duration.
    #[must_use]
    pub fn rules_poll_interval(&self) -> Duration {
        Duration::from_millis(self.rules.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.engine.scan_debounce_ms, 100);
        assert_eq!(config.container.max_depth, 5);
        assert!(config.rules.path.is_none());
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn test_default_engine_config() {
        let engine = EngineConfig::default();

        assert_eq!(engine.scan_debounce(), Duration::from_millis(100));
        assert_eq!(engine.host_poll_interval(), Duration::from_millis(50));
        assert_eq!(engine.host_wait_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_host_wait_timeout_zero_is_unbounded() {
        let engine = EngineConfig {
            host_wait_timeout_ms: 0,
            ..Default::default()
        };
        assert!(engine.host_wait_timeout().is_none());
    }

    #[test]
    fn test_default_container_config() {
        let container = ContainerConfig::default();

        assert_eq!(container.max_depth, 5);
        assert!((container.min_height - 50.0).abs() < f64::EPSILON);
        assert!((container.min_width - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_debounce() {
        let mut config = Config::default();
        config.engine.scan_debounce_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("scan_debounce_ms"));
    }

    #[test]
    fn test_validate_zero_poll_intervals() {
        let mut config = Config::default();
        config.engine.host_poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rules.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_depth() {
        let mut config = Config::default();
        config.container.max_depth = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_depth"));
    }

    #[test]
    fn test_validate_negative_threshold() {
        let mut config = Config::default();
        config.container.min_width = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_profile_regex() {
        let mut config = Config::default();
        config.profiles.push(ProfileConfig {
            name: "forum".to_string(),
            host_pattern: "[invalid".to_string(),
            selectors: vec![],
        });

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("invalid regex"));
    }

    #[test]
    fn test_validate_invalid_profile_selector() {
        let mut config = Config::default();
        config.profiles.push(ProfileConfig {
            name: "forum".to_string(),
            host_pattern: "forum".to_string(),
            selectors: vec!["div >".to_string()],
        });

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("forum"));
    }

    #[test]
    fn test_validate_empty_profile_name() {
        let mut config = Config::default();
        config.profiles.push(ProfileConfig::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rules_path_default() {
        let config = Config::default();
        let path = config.rules_path();

        assert!(path.to_string_lossy().contains("rules.json"));
        assert!(path.to_string_lossy().contains("content-guardian"));
    }

    #[test]
    fn test_rules_path_custom() {
        let mut config = Config::default();
        config.rules.path = Some(PathBuf::from("/custom/rules.json"));

        assert_eq!(config.rules_path(), PathBuf::from("/custom/rules.json"));
    }

    #[test]
    fn test_rules_poll_interval() {
        let config = Config::default();
        assert_eq!(config.rules_poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("content-guardian"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        // Loading from a nonexistent path should work (uses defaults)
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());

        let config = result.unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[engine]
scan_debounce_ms = 250

[container]
max_depth = 3

[[profiles]]
name = "forum"
host_pattern = "forum\\.example"
selectors = [".post-body"]
"#,
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();

        assert_eq!(config.engine.scan_debounce_ms, 250);
        assert_eq!(config.engine.host_poll_interval_ms, 50);
        assert_eq!(config.container.max_depth, 3);
        assert_eq!(config.profiles.len(), 1);
        assert_eq!(config.profiles[0].selectors, vec![".post-body"]);
    }

    #[test]
    fn test_load_unvalidated_keeps_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[engine]\nscan_debounce_ms = 0\n").unwrap();

        let config = Config::load_unvalidated(Some(path.clone())).unwrap();
        assert_eq!(config.engine.scan_debounce_ms, 0);

        let err = Config::load_from(Some(path)).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));
    }

    #[test]
    fn test_engine_config_serialize() {
        let engine = EngineConfig::default();
        let json = serde_json::to_string(&engine).unwrap();
        assert!(json.contains("scan_debounce_ms"));
    }

    #[test]
    fn test_container_config_deserialize() {
        let json = r#"{"max_depth": 8}"#;
        let container: ContainerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(container.max_depth, 8);
        assert!((container.min_width - 100.0).abs() < f64::EPSILON);
    }
}

//! Typed view of configuration.yaml
//!
//! ```yaml
//! logger:
//!   default: info
//!
//! mastertherm:
//!   scan_interval: 30
//!   accounts:
//!     - username: !secret mastertherm_username
//!       password: !secret mastertherm_password
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_yaml::Value;
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;

pub const CONFIG_FILE: &str = "configuration.yaml";

/// Polling interval when `scan_interval` is not set
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);

/// Longest accepted `scan_interval`, one day
pub const MAX_SCAN_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// `logger:` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggerConfig {
    /// Default level filter (e.g., "info", "debug")
    #[serde(default)]
    pub default: Option<String>,
}

/// One MasterTherm cloud account
#[derive(Debug, Clone, Deserialize)]
pub struct MasterthermAccount {
    pub username: String,
    pub password: SecretString,
}

/// `mastertherm:` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MasterthermConfig {
    /// Cloud endpoint override
    #[serde(default)]
    pub base_url: Option<String>,

    /// Seconds between polls
    #[serde(default)]
    pub scan_interval: Option<u64>,

    #[serde(default)]
    pub accounts: Vec<MasterthermAccount>,
}

impl MasterthermConfig {
    pub fn scan_interval(&self) -> Duration {
        self.scan_interval
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SCAN_INTERVAL)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.scan_interval == Some(0) {
            return Err(ConfigError::ValidationFailed {
                message: "mastertherm.scan_interval must be greater than 0".to_string(),
            });
        }
        if self.scan_interval.is_some_and(|secs| secs > MAX_SCAN_INTERVAL.as_secs()) {
            return Err(ConfigError::ValidationFailed {
                message: format!(
                    "mastertherm.scan_interval must be at most {} seconds",
                    MAX_SCAN_INTERVAL.as_secs()
                ),
            });
        }

        for (i, account) in self.accounts.iter().enumerate() {
            if account.username.trim().is_empty() {
                return Err(ConfigError::ValidationFailed {
                    message: format!("mastertherm.accounts[{i}].username is empty"),
                });
            }
            if account.password.expose_secret().is_empty() {
                return Err(ConfigError::ValidationFailed {
                    message: format!("mastertherm.accounts[{i}].password is empty"),
                });
            }
        }

        // Entries are keyed by the lowercased username
        let mut usernames: Vec<String> = self
            .accounts
            .iter()
            .map(|a| a.username.to_lowercase())
            .collect();
        usernames.sort_unstable();
        if let Some(dup) = usernames.windows(2).find(|w| w[0] == w[1]) {
            return Err(ConfigError::ValidationFailed {
                message: format!("mastertherm account {} is configured twice", dup[0]),
            });
        }
        Ok(())
    }
}

/// The sections of configuration.yaml this application reads
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    pub logger: LoggerConfig,
    pub mastertherm: MasterthermConfig,
}

impl Configuration {
    /// Load configuration.yaml from a config directory
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let yaml = load_yaml(config_dir.as_ref(), CONFIG_FILE)?;
        Self::from_yaml(&yaml)
    }

    /// Parse from an already tag-resolved YAML document
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        if yaml.is_null() {
            return Ok(Self::default());
        }
        if !yaml.is_mapping() {
            return Err(ConfigError::InvalidValue {
                key: "root".to_string(),
                reason: "configuration must be a mapping".to_string(),
            });
        }

        let config = Self {
            logger: section(yaml, "logger")?,
            mastertherm: section(yaml, "mastertherm")?,
        };
        config.mastertherm.validate()?;
        Ok(config)
    }
}

// Absent or empty sections fall back to their defaults
fn section<T>(yaml: &Value, key: &str) -> ConfigResult<T>
where
    T: Default + for<'de> Deserialize<'de>,
{
    match yaml.get(key) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => {
            serde_yaml::from_value(value.clone()).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn parse(yaml: &str) -> ConfigResult<Configuration> {
        Configuration::from_yaml(&serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn test_load_with_secrets() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("secrets.yaml"),
            "mastertherm_username: heatpump@example.com\nmastertherm_password: hunter2\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
logger:
  default: debug
mastertherm:
  scan_interval: 60
  accounts:
    - username: !secret mastertherm_username
      password: !secret mastertherm_password
"#,
        )
        .unwrap();

        let config = Configuration::load(dir.path()).unwrap();
        assert_eq!(config.logger.default.as_deref(), Some("debug"));
        assert_eq!(config.mastertherm.scan_interval(), Duration::from_secs(60));

        let account = &config.mastertherm.accounts[0];
        assert_eq!(account.username, "heatpump@example.com");
        assert_eq!(account.password.expose_secret(), "hunter2");
    }

    #[test]
    fn test_defaults() {
        let config = parse("homeassistant:\n  name: Home\n").unwrap();
        assert!(config.logger.default.is_none());
        assert!(config.mastertherm.accounts.is_empty());
        assert!(config.mastertherm.base_url.is_none());
        assert_eq!(config.mastertherm.scan_interval(), DEFAULT_SCAN_INTERVAL);
    }

    #[test]
    fn test_empty_mastertherm_section() {
        let config = parse("mastertherm:\n").unwrap();
        assert!(config.mastertherm.accounts.is_empty());
    }

    #[test]
    fn test_missing_password_is_rejected() {
        let err = parse("mastertherm:\n  accounts:\n    - username: u\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "mastertherm"));
    }

    #[test]
    fn test_zero_scan_interval_is_rejected() {
        let err = parse("mastertherm:\n  scan_interval: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationFailed { .. }));
    }

    #[test]
    fn test_huge_scan_interval_is_rejected() {
        let err = parse("mastertherm:\n  scan_interval: 18446744073709551615\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationFailed { .. }));

        let config = parse("mastertherm:\n  scan_interval: 86400\n").unwrap();
        assert_eq!(config.mastertherm.scan_interval(), MAX_SCAN_INTERVAL);
    }

    #[test]
    fn test_duplicate_account_is_rejected() {
        let err = parse(
            "mastertherm:\n  accounts:\n    - {username: u, password: a}\n    - {username: u, password: b}\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("configured twice"));
    }

    #[test]
    fn test_duplicate_account_ignores_case() {
        let err = parse(
            "mastertherm:\n  accounts:\n    - {username: Me@x.com, password: a}\n    - {username: me@x.com, password: b}\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationFailed { .. }));
    }

    #[test]
    fn test_root_must_be_mapping() {
        assert!(matches!(
            parse("- a\n- b\n"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}

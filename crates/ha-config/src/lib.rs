//! YAML configuration loading
//!
//! Loads `configuration.yaml` with support for Home Assistant's custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR [default]` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use ha_config::Configuration;
//!
//! let config = Configuration::load("/config")?;
//! for account in &config.mastertherm.accounts {
//!     println!("{}", account.username);
//! }
//! ```

mod config;
mod error;
mod loader;
mod secrets;

pub use config::{
    Configuration, LoggerConfig, MasterthermAccount, MasterthermConfig, CONFIG_FILE,
    DEFAULT_SCAN_INTERVAL, MAX_SCAN_INTERVAL,
};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};
pub use secrets::{Secrets, SECRETS_FILE};

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::Value;

//! YAML loader for configuration.yaml
//!
//! Resolves the custom tags a configuration may use:
//! - `!include path` - Splice in another YAML file (relative to the including file)
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR [default]` - Substitute an environment variable

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;
use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// YAML loader bound to a config directory and its secrets
pub struct YamlLoader {
    config_dir: PathBuf,
    secrets: Secrets,
    /// Files currently being loaded, outermost first
    include_stack: Vec<PathBuf>,
}

impl YamlLoader {
    /// Create a loader, reading secrets.yaml from `config_dir`
    pub fn new(config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let config_dir = config_dir.into();
        let secrets = Secrets::load(&config_dir)?;
        Ok(Self::with_secrets(config_dir, secrets))
    }

    pub fn with_secrets(config_dir: impl Into<PathBuf>, secrets: Secrets) -> Self {
        Self {
            config_dir: config_dir.into(),
            secrets,
            include_stack: Vec::new(),
        }
    }

    /// Load a file, relative paths resolving against the config directory
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.resolve(path.as_ref());

        if self.include_stack.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }

        debug!("Loading YAML file: {:?}", path);
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;

        self.include_stack.push(path.clone());
        let result = self.load_string(&content, &path);
        self.include_stack.pop();
        result
    }

    /// Load YAML text as if it were read from `source_path`
    pub fn load_string(&mut self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        if content.trim().is_empty() {
            return Ok(Value::Null);
        }

        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;
        self.resolve_tags(value, source_path)
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn resolve_tags(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.resolve_tag(*tagged, source_path),
            Value::Mapping(map) => {
                let mut resolved = Mapping::with_capacity(map.len());
                for (k, v) in map {
                    resolved.insert(k, self.resolve_tags(v, source_path)?);
                }
                Ok(Value::Mapping(resolved))
            }
            Value::Sequence(seq) => seq
                .into_iter()
                .map(|v| self.resolve_tags(v, source_path))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            other => Ok(other),
        }
    }

    fn resolve_tag(&mut self, tagged: TaggedValue, source_path: &Path) -> ConfigResult<Value> {
        let TaggedValue { tag, value } = tagged;
        trace!("Resolving {} {:?}", tag, value);

        if tag == "include" {
            let path = self.include_path(&value, source_path)?;
            self.load_file(path)
        } else if tag == "secret" {
            let key = tag_argument("!secret", value)?;
            let secret = self.secrets.get(&key)?;
            debug!("Substituted secret: {}", key);
            Ok(Value::String(secret.to_string()))
        } else if tag == "env_var" {
            env_var(&tag_argument("!env_var", value)?)
        } else {
            warn!("Unknown YAML tag {} in {:?}, keeping it", tag, source_path);
            let value = self.resolve_tags(value, source_path)?;
            Ok(Value::Tagged(Box::new(TaggedValue { tag, value })))
        }
    }

    fn include_path(&self, value: &Value, source_path: &Path) -> ConfigResult<PathBuf> {
        let Value::String(raw) = value else {
            return Err(ConfigError::InvalidIncludePath {
                path: format!("{value:?}"),
                reason: "path must be a string".to_string(),
            });
        };

        let path = Path::new(raw);
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        let base = source_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(&self.config_dir);
        Ok(base.join(path))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }
}

fn tag_argument(tag: &str, value: Value) -> ConfigResult<String> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        other => Err(ConfigError::InvalidValue {
            key: tag.to_string(),
            reason: format!("expected a string argument, got {other:?}"),
        }),
    }
}

/// `!env_var NAME` or `!env_var NAME fallback`
fn env_var(argument: &str) -> ConfigResult<Value> {
    let (name, default) = match argument.split_once(char::is_whitespace) {
        Some((name, default)) => (name, Some(default.trim())),
        None => (argument, None),
    };

    match (std::env::var(name), default) {
        (Ok(value), _) => {
            debug!("Substituted env var: {}", name);
            Ok(Value::String(value))
        }
        (Err(_), Some(default)) => Ok(Value::String(default.to_string())),
        (Err(_), None) => Err(ConfigError::EnvVarNotFound {
            var: name.to_string(),
        }),
    }
}

/// Load a file from `config_dir` with tag resolution
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(config_dir)?.load_file(file)
}

/// Load YAML text with tag resolution; includes resolve against `config_dir`
pub fn load_yaml_string(config_dir: impl Into<PathBuf>, content: &str) -> ConfigResult<Value> {
    let mut loader = YamlLoader::new(config_dir)?;
    let source = loader.config_dir().join("<string>");
    loader.load_string(content, &source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn get<'a>(value: &'a Value, key: &str) -> &'a Value {
        value.get(key).unwrap_or_else(|| panic!("missing key {key}"))
    }

    #[test]
    fn test_load_plain_yaml() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "configuration.yaml",
            "logger:\n  default: info\nmastertherm:\n  scan_interval: 30\n",
        );

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        assert_eq!(get(get(&value, "logger"), "default"), "info");
        assert_eq!(
            get(get(&value, "mastertherm"), "scan_interval").as_u64(),
            Some(30)
        );
    }

    #[test]
    fn test_include_is_relative_to_including_file() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "integrations/accounts.yaml", "- username: u\n");
        write_file(
            dir.path(),
            "integrations/mastertherm.yaml",
            "accounts: !include accounts.yaml\n",
        );
        write_file(
            dir.path(),
            "configuration.yaml",
            "mastertherm: !include integrations/mastertherm.yaml\n",
        );

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        let accounts = get(get(&value, "mastertherm"), "accounts");
        assert_eq!(accounts.as_sequence().unwrap().len(), 1);
    }

    #[test]
    fn test_secret() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "secrets.yaml", "mastertherm_password: hunter2\n");
        write_file(
            dir.path(),
            "configuration.yaml",
            "password: !secret mastertherm_password\n",
        );

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        assert_eq!(get(&value, "password"), "hunter2");
    }

    #[test]
    fn test_missing_secret() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "secrets.yaml", "existing: value\n");
        write_file(dir.path(), "configuration.yaml", "password: !secret nope\n");

        let result = load_yaml(dir.path(), "configuration.yaml");
        assert!(matches!(result, Err(ConfigError::SecretNotFound { .. })));
    }

    #[test]
    fn test_env_var() {
        let dir = TempDir::new().unwrap();
        std::env::set_var("HA_CONFIG_TEST_USER", "env_user");
        write_file(
            dir.path(),
            "configuration.yaml",
            "username: !env_var HA_CONFIG_TEST_USER\n",
        );

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        assert_eq!(get(&value, "username"), "env_user");
        std::env::remove_var("HA_CONFIG_TEST_USER");
    }

    #[test]
    fn test_env_var_default() {
        let dir = TempDir::new().unwrap();
        let value = load_yaml_string(
            dir.path(),
            "base_url: !env_var HA_CONFIG_TEST_UNSET_URL http://localhost:8080\n",
        )
        .unwrap();
        assert_eq!(get(&value, "base_url"), "http://localhost:8080");
    }

    #[test]
    fn test_env_var_missing() {
        let dir = TempDir::new().unwrap();
        let result = load_yaml_string(dir.path(), "x: !env_var HA_CONFIG_TEST_UNSET_VAR\n");
        assert!(matches!(result, Err(ConfigError::EnvVarNotFound { .. })));
    }

    #[test]
    fn test_circular_include_detection() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.yaml", "b: !include b.yaml\n");
        write_file(dir.path(), "b.yaml", "a: !include a.yaml\n");

        let result = load_yaml(dir.path(), "a.yaml");
        assert!(matches!(result, Err(ConfigError::CircularInclude { .. })));
    }

    #[test]
    fn test_same_file_included_twice() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "creds.yaml", "username: u\n");
        write_file(
            dir.path(),
            "configuration.yaml",
            "first: !include creds.yaml\nsecond: !include creds.yaml\n",
        );

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        assert_eq!(get(get(&value, "second"), "username"), "u");
    }

    #[test]
    fn test_empty_file_is_null() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "configuration.yaml", "");
        assert!(load_yaml(dir.path(), "configuration.yaml")
            .unwrap()
            .is_null());
    }
}

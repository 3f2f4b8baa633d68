//! Bridge configuration.
//!
//! Settings come from a YAML file (or string), fall back to defaults for
//! missing keys, and can be overridden from the environment:
//!
//! | Variable                    | Field              |
//! |-----------------------------|--------------------|
//! | `CAPBRIDGE_LOG_TARGET`      | `log_target`       |
//! | `CAPBRIDGE_CACHE_SPECS`     | `cache_specs`      |
//! | `CAPBRIDGE_CALL_TIMEOUT_MS` | `call_timeout_ms`  |
//! | `CAPBRIDGE_BIND_ADDR`       | `http.bind_addr`   |
//! | `CAPBRIDGE_BASE_URL`        | `http.base_url`    |

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logger::DEFAULT_TARGET;

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid value for {var}: {value:?}")]
    Env { var: String, value: String },
}

/// HTTP settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Address the provider listens on.
    pub bind_addr: String,
    /// Provider URL the caller connects to.
    pub base_url: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7420".to_string(),
            base_url: "http://127.0.0.1:7420".to_string(),
        }
    }
}

/// Top-level bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// `log` target of the logger injected into capability functions.
    pub log_target: String,
    /// Cache probe and spec answers per client.
    pub cache_specs: bool,
    /// Abandon remote calls after this many milliseconds. `0` disables.
    pub call_timeout_ms: u64,
    pub http: HttpConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_target: DEFAULT_TARGET.to_string(),
            cache_specs: true,
            call_timeout_ms: 0,
            http: HttpConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Parse a YAML document. Missing keys take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError::Io` if the file cannot be read and
    /// `ConfigError::Yaml` if it does not parse.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Overlay `CAPBRIDGE_*` environment variables.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|var| std::env::var(var).ok())
    }

    /// Overlay variables read through `lookup`.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(target) = lookup("CAPBRIDGE_LOG_TARGET") {
            self.log_target = target;
        }
        if let Some(value) = lookup("CAPBRIDGE_CACHE_SPECS") {
            self.cache_specs = parse_bool("CAPBRIDGE_CACHE_SPECS", &value)?;
        }
        if let Some(value) = lookup("CAPBRIDGE_CALL_TIMEOUT_MS") {
            self.call_timeout_ms = value.trim().parse().map_err(|_| ConfigError::Env {
                var: "CAPBRIDGE_CALL_TIMEOUT_MS".to_string(),
                value: value.clone(),
            })?;
        }
        if let Some(addr) = lookup("CAPBRIDGE_BIND_ADDR") {
            self.http.bind_addr = addr;
        }
        if let Some(url) = lookup("CAPBRIDGE_BASE_URL") {
            self.http.base_url = url;
        }
        Ok(self)
    }

    /// The call timeout, if one is set.
    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_ms > 0).then(|| Duration::from_millis(self.call_timeout_ms))
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config =
            BridgeConfig::from_yaml_str("cache_specs: false\nhttp:\n  bind_addr: 0.0.0.0:9000\n")
                .unwrap();
        assert!(!config.cache_specs);
        assert_eq!(config.http.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.http.base_url, HttpConfig::default().base_url);
        assert_eq!(config.log_target, "capbridge");
        assert_eq!(config.call_timeout(), None);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_target: provider\ncall_timeout_ms: 1500").unwrap();

        let config = BridgeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.log_target, "provider");
        assert_eq!(config.call_timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = BridgeConfig::from_file(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CAPBRIDGE_CACHE_SPECS", "off"),
            ("CAPBRIDGE_CALL_TIMEOUT_MS", "250"),
            ("CAPBRIDGE_BASE_URL", "http://provider:7420"),
        ]
        .into_iter()
        .collect();

        let config = BridgeConfig::default()
            .apply_env_from(|var| env.get(var).map(|v| v.to_string()))
            .unwrap();
        assert!(!config.cache_specs);
        assert_eq!(config.call_timeout_ms, 250);
        assert_eq!(config.http.base_url, "http://provider:7420");
        assert_eq!(config.http.bind_addr, HttpConfig::default().bind_addr);
    }

    #[test]
    fn test_bad_env_value() {
        let err = BridgeConfig::default()
            .apply_env_from(|var| (var == "CAPBRIDGE_CACHE_SPECS").then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }
}

//! Configuration for tuplestore
//!
//! This module handles configuration settings for the type registry, the
//! journal and logging. Everything has a usable default so an empty file
//! (or no file at all) yields a working setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{DEFAULT_CONFIG_FILE, DEFAULT_POST_DELEGATED_SCHEMES};
use crate::types::{Error, Result};
use crate::{log_info, log_warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Type registry configuration
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Journal configuration
    #[serde(default)]
    pub journal: JournalConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Type registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// URI schemes resolved locally before asking the parent scope
    #[serde(default = "default_post_delegated_schemes")]
    pub post_delegated_schemes: Vec<String>,

    /// Directories scanned for prototype type definitions
    #[serde(default)]
    pub prototype_dirs: Vec<PathBuf>,

    /// Install the built-in primitive type factory
    #[serde(default = "default_builtin_types")]
    pub builtin_types: bool,
}

/// Journal configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Upper bound for waiting on a pending update, in milliseconds
    ///
    /// `None` waits until the pending update commits or rolls back.
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            post_delegated_schemes: default_post_delegated_schemes(),
            prototype_dirs: Vec::new(),
            builtin_types: default_builtin_types(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions for serde
fn default_post_delegated_schemes() -> Vec<String> {
    DEFAULT_POST_DELEGATED_SCHEMES.iter().map(|s| s.to_string()).collect()
}
fn default_builtin_types() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }

impl JournalConfig {
    /// Wait timeout as a duration
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }
}

impl Config {
    /// Parse configuration from a TOML string and validate it
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| Error::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            // Full filter directives such as "tuplestore=debug" are allowed
            other if other.contains('=') => {}
            _ => return Err(Error::config("Invalid log level")),
        }

        match self.logging.format.as_str() {
            "pretty" | "compact" => {}
            _ => return Err(Error::config("Invalid log format (expected pretty or compact)")),
        }

        for scheme in &self.registry.post_delegated_schemes {
            if scheme.is_empty() || scheme.contains(':') {
                return Err(Error::config(format!("Invalid URI scheme '{}'", scheme)));
            }
        }

        if self.journal.wait_timeout_ms == Some(0) {
            return Err(Error::config("Journal wait timeout must be positive"));
        }

        Ok(())
    }
}

/// Load configuration from file
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::data(format!("Failed to read config file {}", path.display()), e))?;
    Config::from_toml(&contents)
}

/// Load configuration from file or use defaults
///
/// Without a path, `tuplestore.toml` in the working directory is used when
/// it exists.
pub fn load_config_or_default(path: Option<&str>) -> Config {
    match path {
        Some(path) => {
            match load_config(path) {
                Ok(config) => {
                    log_info!("Loaded configuration from: {}", path);
                    config
                }
                Err(e) => {
                    log_warn!("Failed to load config from {}: {}. Using defaults.", path, e);
                    Config::default()
                }
            }
        }
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
            load_config_or_default(Some(DEFAULT_CONFIG_FILE))
        }
        None => {
            log_info!("No config file specified, using defaults");
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.registry.post_delegated_schemes, vec!["file", "local"]);
        assert!(config.registry.builtin_types);
        assert!(config.journal.wait_timeout().is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::from_toml(
            r#"
            [registry]
            post_delegated_schemes = ["file"]
            prototype_dirs = ["./types"]
            builtin_types = false

            [journal]
            wait_timeout_ms = 250

            [logging]
            level = "debug"
            format = "compact"
            "#,
        )
        .unwrap();

        assert_eq!(config.registry.post_delegated_schemes, vec!["file"]);
        assert_eq!(config.registry.prototype_dirs, vec![PathBuf::from("./types")]);
        assert!(!config.registry.builtin_types);
        assert_eq!(config.journal.wait_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.logging.format, "compact");
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Config::from_toml("[logging]\nlevel = \"loud\"").is_err());
        assert!(Config::from_toml("[logging]\nformat = \"xml\"").is_err());
        assert!(Config::from_toml("[journal]\nwait_timeout_ms = 0").is_err());
        assert!(Config::from_toml("[registry]\npost_delegated_schemes = [\"fi:le\"]").is_err());
    }

    #[test]
    fn load_from_file_and_fallback() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[journal]\nwait_timeout_ms = 10").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.journal.wait_timeout_ms, Some(10));

        let fallback = load_config_or_default(Some("/definitely/not/here.toml"));
        assert!(fallback.journal.wait_timeout_ms.is_none());
    }
}

//! Application configuration.
//!
//! A `TallyConfig` is created once at startup (from defaults, a builder or a
//! JSON file) and handed to the execution context. Nothing reads settings
//! from ambient global state.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CommonError, ErrorContext, Result};

/// Where and how wide local execution runs.
///
/// Mirrors the `local`, `local[N]` and `local[*]` master strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Master {
    /// A single worker thread.
    Local,
    /// A fixed number of worker threads.
    LocalThreads(usize),
    /// One worker thread per available CPU.
    LocalAllCores,
}

impl Master {
    /// Parse a master string such as `local[4]`.
    pub fn parse(master: &str) -> Result<Self> {
        let master = master.trim();
        if master == "local" {
            return Ok(Master::Local);
        }
        let inner = master
            .strip_prefix("local[")
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| {
                CommonError::configuration_error(format!("unsupported master '{}'", master))
            })?;
        if inner == "*" {
            return Ok(Master::LocalAllCores);
        }
        let threads: usize = inner
            .parse()
            .with_config_context(|| format!("invalid thread count in master '{}'", master))?;
        if threads == 0 {
            return Err(CommonError::configuration_error(
                "master thread count must be positive",
            ));
        }
        Ok(Master::LocalThreads(threads))
    }

    /// Number of worker threads this master resolves to.
    pub fn parallelism(&self) -> usize {
        match self {
            Master::Local => 1,
            Master::LocalThreads(n) => *n,
            Master::LocalAllCores => num_cpus::get(),
        }
    }
}

/// Top level configuration for a tally application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    /// Application name, used in log lines and query names.
    pub app_name: String,
    /// Master string, e.g. `local[4]`.
    pub master: String,
    /// Maximum log level passed to the tracing subscriber.
    pub log_level: String,
    /// Field delimiter used when a pipeline does not set one.
    pub default_delimiter: char,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            app_name: "tally-app".to_string(),
            master: "local[*]".to_string(),
            log_level: "info".to_string(),
            default_delimiter: ',',
        }
    }
}

impl TallyConfig {
    /// Start building a configuration from defaults.
    pub fn builder() -> TallyConfigBuilder {
        TallyConfigBuilder::new()
    }

    /// Load a configuration from a JSON file. Missing keys take defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_io_context(|| format!("reading config file {}", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Parse a configuration from a JSON string. Missing keys take defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: TallyConfig =
            serde_json::from_str(text).with_config_context(|| "parsing config JSON".to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> Result<()> {
        if self.app_name.trim().is_empty() {
            return Err(CommonError::configuration_error("app_name must not be empty"));
        }
        Master::parse(&self.master)?;
        crate::logging::parse_level(&self.log_level)?;
        if self.default_delimiter == '\n' || self.default_delimiter == '\r' {
            return Err(CommonError::configuration_error(
                "default_delimiter cannot be a line terminator",
            ));
        }
        Ok(())
    }

    /// Parsed master setting.
    pub fn master(&self) -> Result<Master> {
        Master::parse(&self.master)
    }

    /// Number of partitions and worker threads used for local execution.
    pub fn parallelism(&self) -> Result<usize> {
        Ok(self.master()?.parallelism())
    }
}

/// Builder for [`TallyConfig`].
pub struct TallyConfigBuilder {
    config: TallyConfig,
}

impl TallyConfigBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: TallyConfig::default(),
        }
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.config.app_name = name.into();
        self
    }

    /// Set the master string.
    pub fn master(mut self, master: impl Into<String>) -> Self {
        self.config.master = master.into();
        self
    }

    /// Set the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Set the default field delimiter.
    pub fn default_delimiter(mut self, delimiter: char) -> Self {
        self.config.default_delimiter = delimiter;
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<TallyConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for TallyConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_master_parsing() {
        assert_eq!(Master::parse("local").unwrap(), Master::Local);
        assert_eq!(Master::parse("local[4]").unwrap(), Master::LocalThreads(4));
        assert_eq!(Master::parse("local[*]").unwrap(), Master::LocalAllCores);
        assert_eq!(Master::parse("local[4]").unwrap().parallelism(), 4);
        assert!(Master::parse("local[0]").is_err());
        assert!(Master::parse("yarn").is_err());
        assert!(Master::parse("local[x]").is_err());
    }

    #[test]
    fn test_builder() {
        let config = TallyConfig::builder()
            .app_name("TopProducts")
            .master("local[2]")
            .default_delimiter('|')
            .build()
            .unwrap();
        assert_eq!(config.app_name, "TopProducts");
        assert_eq!(config.parallelism().unwrap(), 2);
        assert_eq!(config.default_delimiter, '|');
    }

    #[test]
    fn test_builder_rejects_bad_settings() {
        assert!(TallyConfig::builder().app_name("  ").build().is_err());
        assert!(TallyConfig::builder().log_level("chatty").build().is_err());
        assert!(TallyConfig::builder().default_delimiter('\n').build().is_err());
    }

    #[test]
    fn test_json_defaults_fill_missing_keys() {
        let config = TallyConfig::from_json_str(r#"{"app_name": "Streaming"}"#).unwrap();
        assert_eq!(config.app_name, "Streaming");
        assert_eq!(config.master, "local[*]");
        assert_eq!(config.default_delimiter, ',');
    }

    #[test]
    fn test_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"master": "local", "log_level": "debug"}}"#).unwrap();
        let config = TallyConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.parallelism().unwrap(), 1);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_json_invalid_master() {
        let err = TallyConfig::from_json_str(r#"{"master": "yarn://host:7077"}"#).unwrap_err();
        assert!(matches!(err, CommonError::ConfigurationError { .. }));
    }
}

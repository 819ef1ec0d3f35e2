//! Configuration management for the checkhost runtime host.
//!
//! Supports:
//! - Loading from YAML files
//! - Environment variable overrides (`CHECKHOST__SECTION__KEY`)
//! - Validation of all settings
//! - Runtime search paths, check definitions, telemetry and logging settings

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::Level;

/// Main application configuration.
///
/// # Examples
///
/// ```no_run
/// use checkhost_core::config::AppConfig;
///
/// let config = AppConfig::from_file("checkhost.yaml").unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application-wide settings
    #[serde(default)]
    pub app: ApplicationConfig,

    /// Embedded runtime settings
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Checks to resolve and run
    #[serde(default)]
    pub checks: Vec<CheckConfig>,

    /// Telemetry sender settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path.display().to_string()).into());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Loads configuration using the `config` crate, layering
    /// `CHECKHOST__*` environment variables over the file.
    pub fn from_config_builder<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(
                config::Environment::with_prefix("CHECKHOST")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        config.try_deserialize().map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Validates the configuration.
    ///
    /// Checks for:
    /// - Non-empty runtime search path entries
    /// - Unique, non-empty check names with a module path
    /// - A positive telemetry channel capacity when one is set
    /// - A parseable log level
    pub fn validate(&self) -> Result<()> {
        self.runtime.validate()?;

        let mut seen_names = std::collections::HashSet::new();
        for check in &self.checks {
            check.validate()?;
            if !seen_names.insert(&check.name) {
                return Err(ConfigError::DuplicateCheckName {
                    name: check.name.clone(),
                }
                .into());
            }
        }

        if self.telemetry.channel_capacity == Some(0) {
            return Err(ConfigError::invalid_value(
                "telemetry.channel_capacity",
                "capacity must be greater than zero",
            )
            .into());
        }

        self.logging.parse_level()?;

        Ok(())
    }

    /// Gets a check configuration by name.
    pub fn get_check(&self, name: &str) -> Option<&CheckConfig> {
        self.checks.iter().find(|c| c.name == name)
    }

    /// Gets all enabled checks.
    pub fn enabled_checks(&self) -> Vec<&CheckConfig> {
        self.checks.iter().filter(|c| c.enabled).collect()
    }
}

/// Application-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Hostname reported to checks; falls back to `HOSTNAME` when unset
    pub hostname: Option<String>,

    /// Free-form settings readable by checks through `host_agent.get_config`
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

fn default_app_name() -> String {
    "checkhost".to_string()
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            hostname: None,
            settings: BTreeMap::new(),
        }
    }
}

impl ApplicationConfig {
    /// Resolves the hostname reported to checks.
    pub fn resolved_hostname(&self) -> String {
        self.hostname
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Embedded runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Paths appended, in order, to the runtime's module search path at boot
    #[serde(default)]
    pub search_paths: Vec<String>,

    /// Runtime home directory; boot fails if it is set and missing
    pub home: Option<PathBuf>,

    /// Program name reported by the runtime
    #[serde(default = "default_program_name")]
    pub program_name: String,
}

fn default_program_name() -> String {
    "checkhost".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            home: None,
            program_name: default_program_name(),
        }
    }
}

impl RuntimeConfig {
    /// Validates runtime settings.
    pub fn validate(&self) -> Result<()> {
        if let Some(index) = self.search_paths.iter().position(|p| p.trim().is_empty()) {
            return Err(ConfigError::invalid_value(
                format!("runtime.search_paths[{}]", index),
                "search path entries must not be empty",
            )
            .into());
        }
        if self.program_name.is_empty() {
            return Err(ConfigError::missing_field("runtime.program_name").into());
        }
        Ok(())
    }
}

/// A check to resolve from a loaded module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Check identifier, also used as the sender id
    pub name: String,

    /// Dotted module path; the rightmost component names the loaded module
    pub module: String,

    /// Whether the check is run
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Extra tags appended to every emission
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl CheckConfig {
    /// Validates a single check definition.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ConfigError::missing_field("checks[].name").into());
        }
        if self.module.is_empty() || self.module.split('.').any(str::is_empty) {
            return Err(ConfigError::invalid_value(
                format!("checks.{}.module", self.name),
                format!("invalid module path '{}'", self.module),
            )
            .into());
        }
        Ok(())
    }
}

/// Telemetry sender settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Capacity of the commit channel; unbounded when unset
    pub channel_capacity: Option<usize>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Per-module log levels
    #[serde(default)]
    pub module_levels: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
            module_levels: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Parses the log level string to a tracing Level.
    pub fn parse_level(&self) -> Result<Level> {
        self.level.parse().map_err(|_| {
            ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                reason: format!("Invalid log level: {}", self.level),
            }
            .into()
        })
    }

    /// Builds an `EnvFilter`-style directive string, e.g.
    /// `info,checkhost_runtime=debug`.
    pub fn filter_directive(&self) -> String {
        let mut modules: Vec<_> = self.module_levels.iter().collect();
        modules.sort();
        std::iter::once(self.level.clone())
            .chain(modules.into_iter().map(|(m, l)| format!("{}={}", m, l)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
}

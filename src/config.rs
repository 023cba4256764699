//! Application Configuration
//!
//! Typed configuration loaded from YAML. Unknown keys are rejected at
//! load time, and a handful of `ROCOTOVIEWER_*` environment variables
//! override file values after loading.
//!
//! # Example YAML Format
//!
//! ```yaml
//! workflows:
//!   - path: /scratch/expt/workflow.xml
//!     name: gfs
//!     monitor: true
//!
//! display:
//!   theme: dark
//!   max_log_lines: 500
//!
//! monitor:
//!   poll_interval: 5
//!   max_file_size: 10485760
//!
//! logging:
//!   level: DEBUG
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable naming an alternate config file.
pub const CONFIG_ENV: &str = "ROCOTOVIEWER_CONFIG";

/// Default ceiling for workflow files accepted by the parser (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default seconds between log tailing ticks.
pub const DEFAULT_POLL_INTERVAL: u64 = 10;

/// Default number of log lines kept per tailed file.
pub const DEFAULT_MAX_LOG_LINES: usize = 1000;

const VALID_LOG_LEVELS: &[&str] = &["TRACE", "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL"];

/// One workflow the viewer should load at startup.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    /// Workflow XML file or directory containing it
    pub path: PathBuf,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Whether the path should be watched for changes
    #[serde(default = "default_true")]
    pub monitor: bool,
}

/// Display settings consumed by the UI layer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    pub theme: String,
    /// Seconds between UI refreshes
    pub refresh_interval: u64,
    pub max_log_lines: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            theme: "default".to_string(),
            refresh_interval: 5,
            max_log_lines: DEFAULT_MAX_LOG_LINES,
        }
    }
}

/// File monitoring settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    pub enabled: bool,
    /// Seconds between log tailing ticks
    pub poll_interval: u64,
    /// Largest workflow file the parser accepts, in bytes
    pub max_file_size: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Logging settings applied by the binary.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: None,
        }
    }
}

/// Top-level configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub workflows: Vec<WorkflowConfig>,
    pub display: DisplayConfig,
    pub monitor: MonitorConfig,
    pub logging: LoggingConfig,
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Loads configuration from `path`, or from `$ROCOTOVIEWER_CONFIG`
    /// when no path is given. A missing file yields the defaults.
    /// Environment overrides are applied afterwards.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) if path.exists() => {
                let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                info!("Loaded configuration from {}", path.display());
                Self::from_yaml_str(&content)?
            }
            Some(path) => {
                debug!("Config file {} not found, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_overrides_from(|name| env::var(name).ok())?;
        Ok(config)
    }

    /// Parses configuration from YAML text. An empty document yields the defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Writes the configuration as YAML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Applies `ROCOTOVIEWER_*` overrides using `lookup` to read variables.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(theme) = lookup("ROCOTOVIEWER_THEME") {
            self.display.theme = theme;
        }
        if let Some(value) = lookup("ROCOTOVIEWER_REFRESH_INTERVAL") {
            self.display.refresh_interval = parse_override("ROCOTOVIEWER_REFRESH_INTERVAL", value)?;
        }
        if let Some(level) = lookup("ROCOTOVIEWER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(value) = lookup("ROCOTOVIEWER_POLL_INTERVAL") {
            self.monitor.poll_interval = parse_override("ROCOTOVIEWER_POLL_INTERVAL", value)?;
        }
        Ok(())
    }

    /// Checks value ranges. Returns every problem found, not just the first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        for (i, workflow) in self.workflows.iter().enumerate() {
            if !workflow.path.exists() {
                errors.push(format!(
                    "Workflow path does not exist: {} (workflow {})",
                    workflow.path.display(),
                    i
                ));
            }
        }

        if self.display.refresh_interval == 0 {
            errors.push("Display refresh interval must be positive".to_string());
        }
        if self.display.max_log_lines == 0 {
            errors.push("Display max log lines must be positive".to_string());
        }
        if self.monitor.poll_interval == 0 {
            errors.push("Monitor poll interval must be positive".to_string());
        }
        if self.monitor.max_file_size == 0 {
            errors.push("Monitor max file size must be positive".to_string());
        }

        let level = self.logging.level.to_uppercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            errors.push(format!(
                "Invalid logging level: {}. Valid values: DEBUG, INFO, WARNING, ERROR, CRITICAL",
                self.logging.level
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Log tailing interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.poll_interval)
    }

    /// Maps the configured level onto a `log` filter name.
    pub fn log_filter(&self) -> &'static str {
        match self.logging.level.to_uppercase().as_str() {
            "TRACE" => "trace",
            "DEBUG" => "debug",
            "WARNING" | "WARN" => "warn",
            "ERROR" | "CRITICAL" => "error",
            _ => "info",
        }
    }
}

fn parse_override<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Override { name, value })
}

//! Configuration settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::UnitError;
use crate::history::url_dialect;
use crate::ipc::BusScope;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub units: UnitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub container: ContainerConfig,
}

/// Where unit files go and which manager loads them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnitsConfig {
    /// Unit directory. Defaults to the manager's directory for `scope`.
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub scope: BusScope,
    /// Directory of `.tera` files overriding the built-in unit templates.
    pub templates_dir: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Run history store.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Store URL, `memory://` or `jsonl://<path>`.
    #[serde(default = "default_history_url")]
    pub url: String,
}

/// Container runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerConfig {
    /// Runtime binary.
    #[serde(default = "default_runtime")]
    pub runtime: String,
    /// Timeout for one runtime call in seconds.
    #[serde(default = "default_container_timeout")]
    pub timeout_seconds: u64,
    /// Command that runs a container service by identifier.
    #[serde(default = "default_run_launcher")]
    pub run_launcher: String,
}

const HISTORY_DIALECTS: &[&str] = &["memory", "jsonl"];

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_history_url() -> String {
    "memory://".to_string()
}

fn default_runtime() -> String {
    "docker".to_string()
}

fn default_container_timeout() -> u64 {
    120
}

fn default_run_launcher() -> String {
    "taskflow-run-container".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            url: default_history_url(),
        }
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            timeout_seconds: default_container_timeout(),
            run_launcher: default_run_launcher(),
        }
    }
}

impl ContainerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl UnitsConfig {
    /// The configured directory, or the manager's default for the scope.
    pub fn resolved_dir(&self) -> Result<PathBuf, UnitError> {
        if let Some(dir) = &self.dir {
            return Ok(dir.clone());
        }
        match self.scope {
            BusScope::System => Ok(PathBuf::from("/etc/systemd/system")),
            BusScope::User => std::env::var_os("HOME")
                .filter(|home| !home.is_empty())
                .map(|home| PathBuf::from(home).join(".config/systemd/user"))
                .ok_or_else(|| UnitError::Config {
                    message: "HOME is not set; configure units.dir".to_string(),
                }),
        }
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, UnitError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| UnitError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        let settings = Self::from_toml(&content).map_err(|e| UnitError::Config {
            message: format!("Invalid config file '{}': {}", path.display(), e),
        })?;

        Ok(settings)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, UnitError> {
        let settings: Settings = toml::from_str(content).map_err(|e| UnitError::Config {
            message: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), UnitError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(UnitError::Config {
                message: format!(
                    "Invalid log level '{}'. Valid levels: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(UnitError::Config {
                message: format!(
                    "Invalid log format '{}'. Valid formats: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        let dialect = url_dialect(&self.history.url)?;
        if !HISTORY_DIALECTS.contains(&dialect) {
            return Err(UnitError::Config {
                message: format!(
                    "Unsupported history store dialect '{}'. Valid dialects: {:?}",
                    dialect, HISTORY_DIALECTS
                ),
            });
        }

        if matches!(&self.units.dir, Some(dir) if dir.as_os_str().is_empty()) {
            return Err(UnitError::Config {
                message: "units.dir must not be empty".to_string(),
            });
        }

        if self.container.timeout_seconds == 0 {
            return Err(UnitError::Config {
                message: "container.timeout_seconds must be positive".to_string(),
            });
        }

        Ok(())
    }
}

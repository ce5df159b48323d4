//! Configuration for the disk monitor.
//!
//! YAML with precedence: CLI > file > defaults.

use crate::device::{OverallStatus, SizeUnit, Smartctl};
use crate::error::{Result, SmartError};
use crate::state::Level;
use crate::temperature::TempUnit;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Refresh interval in milliseconds.
    #[serde(default = "default_update_ms")]
    pub update_ms: u64,
    /// Temperature scale used for display.
    #[serde(default)]
    pub temp_scale: TempUnit,
    /// `smartctl` binary to run.
    #[serde(default = "default_smartctl")]
    pub smartctl: String,
    /// Timeout for each `smartctl` run, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_update_ms() -> u64 {
    60_000
}

fn default_smartctl() -> String {
    "smartctl".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            update_ms: default_update_ms(),
            temp_scale: TempUnit::default(),
            smartctl: default_smartctl(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// A declared state, overriding the built-in one for the same status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateConfig {
    /// Status this state describes.
    pub value: OverallStatus,
    /// Short identifier.
    pub name: String,
    /// Severity.
    #[serde(default)]
    pub level: Level,
    /// Summary template.
    #[serde(default)]
    pub summary: String,
    /// Body template.
    #[serde(default)]
    pub body: String,
}

/// Disk agent settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DiskConfig {
    /// Monitor only this device instead of enumerating disks.
    #[serde(default)]
    pub device_name: Option<PathBuf>,
    /// Agent name; defaults to the device basename.
    #[serde(default)]
    pub name: Option<String>,
    /// Agent label; defaults to "Hard disk <name>".
    #[serde(default)]
    pub label: Option<String>,
    /// Unit of the I/O figures; absent disables I/O accounting.
    #[serde(default)]
    pub io_unit: Option<String>,
    /// Skip status reads while the disk is asleep.
    #[serde(default)]
    pub skip_sleeping: bool,
    /// Declared states.
    #[serde(default)]
    pub states: Vec<StateConfig>,
}

impl DiskConfig {
    /// Parsed I/O unit.
    #[must_use]
    pub fn io_unit(&self) -> Option<SizeUnit> {
        self.io_unit.as_deref().and_then(|u| u.parse().ok())
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Global settings.
    #[serde(default)]
    pub global: GlobalConfig,
    /// Disk agent settings.
    #[serde(default)]
    pub disk: DiskConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            global: GlobalConfig::default(),
            disk: DiskConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration file location.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("smart-monitor").join("config.yaml"))
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| SmartError::ConfigNotFound(path.display().to_string()))?;
        Self::parse(&content)
    }

    /// Parses and validates configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`SmartError::ConfigParse`] with the line number if parsing
    /// fails, [`SmartError::ConfigInvalid`] if a value is rejected.
    pub fn parse(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml).map_err(|e| {
            let line = e.location().map_or(0, |l| l.line());
            SmartError::ConfigParse { line, message: e.to_string() }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration with fallback to defaults.
    #[must_use]
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(SmartError::ConfigNotFound(_)) => Self::default(),
            Err(e) => {
                log::warn!("ignoring {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Checks values serde cannot check.
    ///
    /// # Errors
    ///
    /// Returns [`SmartError::ConfigInvalid`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.global.update_ms == 0 {
            return Err(invalid("global.update_ms", "must be greater than zero"));
        }
        if let Some(unit) = &self.disk.io_unit {
            unit.parse::<SizeUnit>().map_err(|e| invalid("disk.io-unit", e))?;
        }

        let mut seen = HashSet::new();
        for (i, state) in self.disk.states.iter().enumerate() {
            if state.name.trim().is_empty() {
                return Err(invalid(format!("disk.states[{i}].name"), "must not be empty"));
            }
            if !seen.insert(state.value) {
                return Err(invalid(
                    format!("disk.states[{i}].value"),
                    format!("'{}' is declared twice", state.value),
                ));
            }
        }
        Ok(())
    }

    /// Returns the update interval as a Duration.
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.global.update_ms)
    }

    /// Device opener configured from the global settings.
    #[must_use]
    pub fn smartctl(&self) -> Smartctl {
        Smartctl::new()
            .with_program(self.global.smartctl.clone())
            .with_timeout(Duration::from_millis(self.global.timeout_ms))
    }
}

fn invalid(key: impl Into<String>, message: impl Into<String>) -> SmartError {
    SmartError::ConfigInvalid { key: key.into(), message: message.into() }
}

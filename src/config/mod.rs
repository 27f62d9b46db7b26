//! Configuration management
//!
//! Loads and saves configuration from XDG-compliant paths.
//! Config location: ~/.config/crowdmap/config.toml

pub mod defaults;

use crate::error::{Error, Result};
use crate::grid::Precision;
use crate::store::snapshot::Snapshot;
use defaults::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Anchor grid settings
    #[serde(default)]
    pub grid: GridConfig,

    /// Neighborhood estimator settings
    #[serde(default)]
    pub neighborhood: NeighborhoodConfig,

    /// Server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Snapshot storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Anchor grid settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Cells per degree; changing it starts a fresh set of anchors
    #[serde(default = "default_precision")]
    pub precision: f64,
}

/// Neighborhood estimator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborhoodConfig {
    /// Half-width of the search box in degrees
    #[serde(default = "default_half_width")]
    pub half_width: f64,

    /// Kernel bandwidth in degrees
    #[serde(default = "default_sigma")]
    pub sigma: f64,
}

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Snapshot storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Snapshot file; the XDG data directory is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<String>,

    /// Seconds between snapshots while serving; 0 saves only on shutdown
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format
    #[serde(default = "default_format")]
    pub format: String,
}

// Default value functions for serde
fn default_precision() -> f64 {
    DEFAULT_PRECISION
}
fn default_half_width() -> f64 {
    DEFAULT_HALF_WIDTH
}
fn default_sigma() -> f64 {
    DEFAULT_SIGMA
}
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_snapshot_interval() -> u64 {
    DEFAULT_SNAPSHOT_INTERVAL_SECS
}
fn default_format() -> String {
    DEFAULT_FORMAT.to_string()
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            precision: default_precision(),
        }
    }
}

impl Default for NeighborhoodConfig {
    fn default() -> Self {
        Self {
            half_width: default_half_width(),
            sigma: default_sigma(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            snapshot_interval_secs: default_snapshot_interval(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join(APP_DIR_NAME))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the default path
    ///
    /// Creates default config if file doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!("Failed to read config file: {}", e))
            })?;

            let config: Config = toml::from_str(&content).map_err(|e| {
                Error::Config(format!("Failed to parse config file: {}", e))
            })?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            Error::Config(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(&path, content).map_err(|e| {
            Error::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Check numeric settings are usable
    pub fn validate(&self) -> Result<()> {
        self.precision()?;
        check_positive("neighborhood.sigma", self.neighborhood.sigma)?;
        if !self.neighborhood.half_width.is_finite() || self.neighborhood.half_width < 0.0 {
            return Err(Error::Config(format!(
                "neighborhood.half_width must be non-negative, got {}",
                self.neighborhood.half_width
            )));
        }
        Ok(())
    }

    /// Configured grid resolution
    pub fn precision(&self) -> Result<Precision> {
        Precision::new(self.grid.precision)
            .map_err(|e| Error::Config(format!("grid.precision: {}", e)))
    }

    /// Snapshot file location
    pub fn snapshot_path(&self) -> Result<PathBuf> {
        match &self.storage.snapshot_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Snapshot::default_path(),
        }
    }

    /// Get a configuration value by key path
    ///
    /// Key format: "section.key"
    /// Returns the value as a string, or None if not found
    pub fn get(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["grid", "precision"] => Some(self.grid.precision.to_string()),

            ["neighborhood", "half_width"] => Some(self.neighborhood.half_width.to_string()),
            ["neighborhood", "sigma"] => Some(self.neighborhood.sigma.to_string()),

            ["server", "host"] => Some(self.server.host.clone()),
            ["server", "port"] => Some(self.server.port.to_string()),

            ["storage", "snapshot_path"] => Some(
                self.storage
                    .snapshot_path
                    .clone()
                    .unwrap_or_default(),
            ),
            ["storage", "snapshot_interval_secs"] => {
                Some(self.storage.snapshot_interval_secs.to_string())
            }

            ["output", "format"] => Some(self.output.format.clone()),

            _ => None,
        }
    }

    /// Set a configuration value by key path
    ///
    /// Key format: "section.key"
    /// Returns error if key is invalid or value type is wrong
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["grid", "precision"] => {
                let precision = parse_f64(key, value)?;
                Precision::new(precision)
                    .map_err(|e| Error::Config(format!("Invalid precision: {}", e)))?;
                self.grid.precision = precision;
            }

            ["neighborhood", "half_width"] => {
                let half_width = parse_f64(key, value)?;
                if half_width < 0.0 {
                    return Err(Error::Config(format!(
                        "Invalid half_width value: {}",
                        value
                    )));
                }
                self.neighborhood.half_width = half_width;
            }
            ["neighborhood", "sigma"] => {
                let sigma = parse_f64(key, value)?;
                check_positive(key, sigma)?;
                self.neighborhood.sigma = sigma;
            }

            ["server", "host"] => {
                self.server.host = value.to_string();
            }
            ["server", "port"] => {
                self.server.port = value.parse().map_err(|_| {
                    Error::Config(format!("Invalid port value: {}", value))
                })?;
            }

            ["storage", "snapshot_path"] => {
                self.storage.snapshot_path = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            ["storage", "snapshot_interval_secs"] => {
                self.storage.snapshot_interval_secs = value.parse().map_err(|_| {
                    Error::Config(format!("Invalid snapshot interval: {}", value))
                })?;
            }

            ["output", "format"] => {
                self.output.format = crate::format::require_formatter(value)?.name().to_string();
            }

            _ => {
                return Err(Error::Config(format!("Unknown config key: {}", key)));
            }
        }

        Ok(())
    }

    /// List all available config keys
    pub fn available_keys() -> Vec<&'static str> {
        vec![
            "grid.precision",
            "neighborhood.half_width",
            "neighborhood.sigma",
            "server.host",
            "server.port",
            "storage.snapshot_path",
            "storage.snapshot_interval_secs",
            "output.format",
        ]
    }

    /// Get server address as "host:port"
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_f64(key: &str, value: &str) -> Result<f64> {
    let parsed: f64 = value
        .parse()
        .map_err(|_| Error::Config(format!("Invalid {} value: {}", key, value)))?;
    if !parsed.is_finite() {
        return Err(Error::Config(format!("Invalid {} value: {}", key, value)));
    }
    Ok(parsed)
}

fn check_positive(key: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::Config(format!("{} must be positive, got {}", key, value)));
    }
    Ok(())
}

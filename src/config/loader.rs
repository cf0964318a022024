//! Configuration file loader.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Warden configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Root directory holding server instance subdirectories.
    pub servers_dir: Option<PathBuf>,
    /// Console settings.
    pub console: ConsoleConfig,
    /// Graceful stop settings.
    pub stop: StopConfig,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            servers_dir: None,
            console: ConsoleConfig::default(),
            stop: StopConfig::default(),
        }
    }
}

impl WardenConfig {
    /// Resolve the servers root: the configured directory, or `./servers`.
    #[must_use]
    pub fn servers_root(&self) -> PathBuf {
        self.servers_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("servers"))
    }
}

/// Console decoding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Text encoding label for child output (e.g. `"utf-8"`, `"ibm866"`).
    pub encoding: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            encoding: "utf-8".to_string(),
        }
    }
}

/// Graceful stop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StopConfig {
    /// Shutdown command written to the child's input channel.
    pub command: String,
    /// How long to wait for voluntary exit before forced termination.
    pub timeout_secs: u64,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            command: "stop".to_string(),
            timeout_secs: 10,
        }
    }
}

impl StopConfig {
    /// The stop deadline as a `Duration`.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Configuration loader that searches multiple locations.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        // 1. Current directory: .server-warden.toml
        search_paths.push(PathBuf::from(".server-warden.toml"));

        // 2. User config directory: ~/.config/server-warden/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("server-warden").join("config.toml"));
        }

        Self { search_paths }
    }

    /// Create a config loader with a specific config file path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
        }
    }

    /// Load configuration from the first available file, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load(&self) -> Result<WardenConfig, ConfigError> {
        for path in &self.search_paths {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Loading config file");
                return Self::load_from_path(path);
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(WardenConfig::default())
    }

    /// Load configuration from a specific path.
    fn load_from_path(path: &PathBuf) -> Result<WardenConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            source: e,
        })
    }

    /// Get the search paths for debugging.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Find the first config file that exists.
    #[must_use]
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths.iter().find(|p| p.exists()).cloned()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

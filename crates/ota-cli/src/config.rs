//! Configuration file handling for ota-cli

use anyhow::{Context, Result};
use ota_client::UploadConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default upload target
    pub target: Option<String>,
    /// Default firmware image
    pub firmware: Option<PathBuf>,
    /// Default output format
    pub output: Option<String>,
    /// Disable colored output
    pub no_color: Option<bool>,
    /// Client settings (credentials, endpoint, timeouts, TLS)
    #[serde(default)]
    pub upload: UploadConfig,
}

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ArgOverrides<'a> {
    pub target: Option<&'a str>,
    pub firmware: Option<PathBuf>,
    pub output: Option<&'a str>,
    pub no_color: bool,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub ca_file: Option<&'a Path>,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("ota-cli");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(&self, args: ArgOverrides<'_>) -> MergedConfig {
        let mut upload = self.upload.clone();
        if let Some(username) = args.username {
            upload.credentials.username = username.to_string();
        }
        if let Some(password) = args.password {
            upload.credentials.password = password.to_string();
        }
        if let Some(ca_file) = args.ca_file {
            upload.tls.ca_file = Some(ca_file.to_path_buf());
        }

        MergedConfig {
            target: args
                .target
                .map(String::from)
                .or_else(|| self.target.clone())
                .filter(|t| !t.trim().is_empty()),
            firmware: args.firmware.or_else(|| self.firmware.clone()),
            output: args
                .output
                .map(String::from)
                .or_else(|| self.output.clone())
                .unwrap_or_else(|| "text".to_string()),
            no_color: args.no_color || self.no_color.unwrap_or(false),
            upload,
        }
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    /// Upload target; `None` when neither args nor file give a non-empty one
    pub target: Option<String>,
    pub firmware: Option<PathBuf>,
    pub output: String,
    pub no_color: bool,
    pub upload: UploadConfig,
}

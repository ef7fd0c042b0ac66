//! Configuration management for murmur.
//!
//! The session core only ever reads a snapshot of this configuration at
//! start time; edits made while a session is running take effect on the
//! next start.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::APP_NAME;

/// Which transcription backend a session should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendChoice {
    /// Host recognizer, on-device recognition required
    OnDeviceOnly,
    /// Host recognizer, on-device preferred with cloud fallback
    #[default]
    Automatic,
    /// One-shot HTTP transcription of the whole recording (requires API key)
    RemoteApi,
}

/// Configuration structure for the application.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Transcription backend to use
    #[serde(default, skip_serializing_if = "is_default_backend")]
    pub backend: BackendChoice,

    /// Recognition locale (BCP 47, e.g. "en-US"). None = system locale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Endpoint for the remote-api backend. None = built-in default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_endpoint: Option<String>,

    /// API key for the remote-api backend. Plain text; if your threat model
    /// includes arbitrary reads of your config directory you have bigger
    /// problems.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_api_key: Option<String>,

    /// Input device name. None = system default input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_device: Option<String>,

    /// Emit partial transcripts for live display
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub live_preview: bool,

    /// Recognize spoken commands ("select all", "period", ...) instead of
    /// inserting them literally
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub voice_commands: bool,

    /// Local whisper model name, when built with the local-whisper feature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_model: Option<String>,
}

fn default_true() -> bool {
    true
}

fn is_true(v: &bool) -> bool {
    *v
}

fn is_default_backend(v: &BackendChoice) -> bool {
    *v == BackendChoice::default()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendChoice::default(),
            locale: None,
            remote_endpoint: None,
            remote_api_key: None,
            input_device: None,
            live_preview: true,
            voice_commands: true,
            local_model: None,
        }
    }
}

impl Config {
    /// Get the configured recognition locale
    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    /// Get the remote API key
    pub fn remote_api_key(&self) -> Option<&str> {
        self.remote_api_key.as_deref()
    }

    /// Get the remote endpoint override
    pub fn remote_endpoint(&self) -> Option<&str> {
        self.remote_endpoint.as_deref()
    }

    /// Get the input device name, treating an empty string as unset
    pub fn input_device(&self) -> Option<&str> {
        self.input_device.as_deref().filter(|d| !d.is_empty())
    }
}

/// Manages loading and saving configuration files.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Creates a new ConfigManager with the default configuration directory.
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Ok(Self { config_path })
    }

    /// Creates a new ConfigManager with a specified configuration directory.
    #[cfg(test)]
    pub fn with_config_dir<P: AsRef<std::path::Path>>(dir: P) -> Self {
        let config_path = dir.as_ref().join(format!("{}.toml", APP_NAME));
        Self { config_path }
    }

    /// Returns the default path to the configuration file.
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to retrieve configuration directory")?;
        Ok(config_dir.join(APP_NAME).join(format!("{}.toml", APP_NAME)))
    }

    /// Loads the configuration from the config file or returns default.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let config_content = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config file at {:?}", self.config_path))?;

        let config: Config = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file at {:?}", self.config_path))?;

        if config.backend == BackendChoice::RemoteApi && config.remote_api_key().is_none() {
            warn!(
                "Backend is remote-api but no API key is set. Sessions will fail \
                 to start until one is configured."
            );
        }

        Ok(config)
    }

    /// Saves the configuration to the config file.
    pub fn save(&self, config: &Config) -> Result<()> {
        let config_dir = self
            .config_path
            .parent()
            .with_context(|| format!("Failed to get parent directory of {:?}", self.config_path))?;

        fs::create_dir_all(config_dir)
            .with_context(|| format!("Failed to create config directory at {:?}", config_dir))?;

        let serialized =
            toml::to_string_pretty(&config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, serialized)
            .with_context(|| format!("Failed to write config file at {:?}", self.config_path))?;

        Ok(())
    }

    /// Returns the path to the configuration file.
    pub fn config_path(&self) -> &std::path::Path {
        &self.config_path
    }
}

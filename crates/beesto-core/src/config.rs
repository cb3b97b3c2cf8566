//! Configuration for the phase endpoint, the editor and the project workspace.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs::home_dir;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::files::SKIPPED_DIRECTORIES;
use crate::{Error, Result};

/// Environment variable overriding the endpoint URL from the config file.
pub const ENV_ENDPOINT_URL: &str = "BEESTO_ENDPOINT_URL";

/// Complete agent configuration.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Phase endpoint settings
    pub endpoint: EndpointConfig,
    /// Editor settings
    pub editor: EditorConfig,
    /// Project tree settings
    pub workspace: WorkspaceConfig,
}

/// Where and how phase requests are sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// URL of the agent phase endpoint
    pub url: String,
    /// Timeout in seconds for establishing a phase request
    pub connect_timeout_seconds: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000/api/ai/agent".to_owned(),
            connect_timeout_seconds: 30,
        }
    }
}

impl EndpointConfig {
    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

/// Editor behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Whether edits are saved automatically
    pub auto_save: bool,
    /// Quiet period in milliseconds before an auto-save fires
    pub auto_save_delay_ms: u64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            auto_save: true,
            auto_save_delay_ms: 1000,
        }
    }
}

impl EditorConfig {
    /// Auto-save debounce window as a [`Duration`].
    pub fn auto_save_delay(&self) -> Duration {
        Duration::from_millis(self.auto_save_delay_ms)
    }
}

/// Project tree behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory names skipped when walking the project
    pub skipped_directories: Vec<String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            skipped_directories: SKIPPED_DIRECTORIES.iter().map(|&name| name.to_owned()).collect(),
        }
    }
}

impl AgentConfig {
    /// Get the default config directory path (`~/.beesto`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        let home =
            home_dir().ok_or_else(|| Error::Config("Could not determine home directory".to_owned()))?;
        Ok(home.join(".beesto"))
    }

    /// Get the default config file path (`~/.beesto/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location, creating it with defaults if missing.
    ///
    /// # Errors
    /// Returns an error if the config cannot be read or created
    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        let config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            let config = Self::default();
            config.save_to_file(&config_path)?;
            config
        };
        Ok(config.with_env_overrides())
    }

    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|error| Error::Config(format!("Failed to read config: {error}")))?;
        let config: Self = toml::from_str(&contents)?;

        debug!(
            "Loaded config from {:?}: endpoint={}, auto_save={}",
            path, config.endpoint.url, config.editor.auto_save
        );

        Ok(config)
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                Error::Config(format!("Failed to create config directory: {error}"))
            })?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|error| Error::Config(format!("Failed to serialize config: {error}")))?;

        let header = "# Beesto Configuration File\n\
                      # This file is automatically generated on first run\n\
                      # Edit this file to customize your settings\n\n";

        fs::write(path, format!("{header}{contents}"))
            .map_err(|error| Error::Config(format!("Failed to write config: {error}")))?;

        Ok(())
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = env::var(ENV_ENDPOINT_URL)
            && !url.trim().is_empty()
        {
            self.endpoint.url = url;
        }
        self
    }
}

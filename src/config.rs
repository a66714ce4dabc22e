use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub windows: WindowSettings,
    #[serde(default)]
    pub toasts: ToastSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSettings {
    /// How long an animated window stays in the exiting list after removal
    #[serde(default = "default_exit_transition_ms")]
    pub exit_transition_ms: u64,
}

fn default_exit_transition_ms() -> u64 {
    200
}

impl WindowSettings {
    pub fn exit_transition(&self) -> Duration {
        Duration::from_millis(self.exit_transition_ms)
    }
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            exit_transition_ms: default_exit_transition_ms(),
        }
    }
}

/// Toast lifetimes per duration class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToastSettings {
    #[serde(default = "default_shortest_ms")]
    pub shortest_ms: u64,
    #[serde(default = "default_short_ms")]
    pub short_ms: u64,
    #[serde(default = "default_medium_ms")]
    pub medium_ms: u64,
    #[serde(default = "default_long_ms")]
    pub long_ms: u64,
}

fn default_shortest_ms() -> u64 {
    1000
}

fn default_short_ms() -> u64 {
    2000
}

fn default_medium_ms() -> u64 {
    4000
}

fn default_long_ms() -> u64 {
    8000
}

impl Default for ToastSettings {
    fn default() -> Self {
        Self {
            shortest_ms: default_shortest_ms(),
            short_ms: default_short_ms(),
            medium_ms: default_medium_ms(),
            long_ms: default_long_ms(),
        }
    }
}

impl Config {
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "linux") {
            // XDG config directory on Linux
            dirs::config_dir()
                .context("Failed to get XDG config directory")?
                .join("compass-navigator")
        } else {
            dirs::home_dir()
                .context("Failed to get home directory")?
                .join(".compass-navigator")
        };

        Ok(config_dir.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load from an explicit path; a missing file yields defaults
    pub fn load_from(config_path: &Path) -> Result<Self> {
        debug!("Loading config from: {:?}", config_path);

        if !config_path.exists() {
            info!("Config file doesn't exist, using defaults");
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: Config = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        debug!(
            "Loaded config: exit transition {}ms, short toast {}ms",
            config.windows.exit_transition_ms, config.toasts.short_ms
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        debug!("Saving config to: {:?}", config_path);

        if let Some(config_dir) = config_path.parent() {
            if !config_dir.exists() {
                fs::create_dir_all(config_dir).with_context(|| {
                    format!("Failed to create config directory: {:?}", config_dir)
                })?;
                info!("Created config directory: {:?}", config_dir);
            }
        }

        let config_content = self.to_toml()?;
        fs::write(config_path, config_content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        info!("Config saved successfully");
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config to TOML")
    }
}

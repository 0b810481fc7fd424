// Configuration management for the radiod CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/radiod/config.json
// - Linux: ~/.config/radiod/config.json
// - Windows: %APPDATA%\radiod\config.json

use anyhow::{Context, Result};
use radiod_core::{ControllerConfig, ProfileId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Adapter controller settings
    pub controller: ControllerConfig,

    /// Where the "radio should be on" preference lives
    pub settings_path: Option<String>,

    /// Simulated profile start/stop latency in milliseconds
    pub profile_delay_ms: u64,

    /// Name reported by the simulated radio
    pub adapter_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            settings_path: None,
            profile_delay_ms: 50,
            adapter_name: "radiod".to_string(),
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("radiod");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the data directory path (cross-platform)
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to determine data directory")?
            .join("radiod");

        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        Ok(data_dir)
    }

    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            config
                .controller
                .validate()
                .context("Invalid controller configuration")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Resolved settings file path
    pub fn settings_file(&self) -> Result<PathBuf> {
        match &self.settings_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(Self::data_dir()?.join("settings.json")),
        }
    }

    /// Set a config value. The caller decides when to save.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.clone();

        match key {
            "profiles" => {
                updated.controller.profiles = value
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::parse::<ProfileId>)
                    .collect::<Result<_, _>>()
                    .context("Invalid profile list")?;
            }
            "convergence_timeout_ms" => {
                updated.controller.convergence_timeout_ms = match value {
                    "" | "none" => None,
                    ms => Some(ms.parse().context("Invalid number")?),
                };
            }
            "airplane_mode_radios" => {
                updated.controller.airplane_mode_radios = optional(value);
            }
            "airplane_toggleable_radios" => {
                updated.controller.airplane_toggleable_radios = optional(value);
            }
            "settings_path" => {
                updated.settings_path = optional(value);
            }
            "profile_delay_ms" => {
                updated.profile_delay_ms = value.parse().context("Invalid number")?;
            }
            "adapter_name" => {
                updated.adapter_name = value.to_string();
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        updated
            .controller
            .validate()
            .context("Invalid controller configuration")?;
        *self = updated;
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "profiles" => Some(self.profile_list()),
            "convergence_timeout_ms" => Some(
                self.controller
                    .convergence_timeout_ms
                    .map_or_else(|| "none".to_string(), |ms| ms.to_string()),
            ),
            "airplane_mode_radios" => self.controller.airplane_mode_radios.clone(),
            "airplane_toggleable_radios" => self.controller.airplane_toggleable_radios.clone(),
            "settings_path" => self.settings_path.clone(),
            "profile_delay_ms" => Some(self.profile_delay_ms.to_string()),
            "adapter_name" => Some(self.adapter_name.clone()),
            _ => None,
        }
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        const KEYS: [&str; 7] = [
            "profiles",
            "convergence_timeout_ms",
            "airplane_mode_radios",
            "airplane_toggleable_radios",
            "settings_path",
            "profile_delay_ms",
            "adapter_name",
        ];

        KEYS.iter()
            .map(|key| {
                (
                    key.to_string(),
                    self.get(key).unwrap_or_else(|| "(default)".to_string()),
                )
            })
            .collect()
    }

    fn profile_list(&self) -> String {
        self.controller
            .profiles
            .iter()
            .map(ProfileId::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

//! Persisted "radio should be on" preference
//!
//! Written only on explicit user enable/disable, never when an ambient
//! condition turns the radio off or back on.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Settings I/O error: {0}")]
    Io(String),

    #[error("Settings file is corrupt: {0}")]
    Corrupt(String),
}

#[cfg_attr(test, mockall::automock)]
pub trait SettingsStore: Send + Sync {
    fn radio_should_be_on(&self) -> bool;
    fn persist_radio_on(&self, on: bool) -> Result<(), SettingsError>;
}

/// Non-durable store, handy for tests and embedders without storage
#[derive(Debug, Default)]
pub struct InMemorySettings {
    radio_on: RwLock<bool>,
}

impl InMemorySettings {
    pub fn new(radio_on: bool) -> Self {
        Self {
            radio_on: RwLock::new(radio_on),
        }
    }
}

impl SettingsStore for InMemorySettings {
    fn radio_should_be_on(&self) -> bool {
        *self.radio_on.read()
    }

    fn persist_radio_on(&self, on: bool) -> Result<(), SettingsError> {
        *self.radio_on.write() = on;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct PersistedSettings {
    radio_on: bool,
}

/// JSON file backed store that survives process restarts
#[derive(Debug)]
pub struct JsonFileSettings {
    path: PathBuf,
    cached: RwLock<PersistedSettings>,
}

impl JsonFileSettings {
    /// Open the store, starting from "off" when the file does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();

        let cached = if path.exists() {
            let contents =
                std::fs::read_to_string(&path).map_err(|e| SettingsError::Io(e.to_string()))?;
            serde_json::from_str(&contents).map_err(|e| SettingsError::Corrupt(e.to_string()))?
        } else {
            PersistedSettings::default()
        };

        Ok(Self {
            path,
            cached: RwLock::new(cached),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileSettings {
    fn radio_should_be_on(&self) -> bool {
        self.cached.read().radio_on
    }

    fn persist_radio_on(&self, on: bool) -> Result<(), SettingsError> {
        let mut cached = self.cached.write();
        let updated = PersistedSettings { radio_on: on };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::Io(e.to_string()))?;
        }
        let contents =
            serde_json::to_string_pretty(&updated).map_err(|e| SettingsError::Io(e.to_string()))?;
        std::fs::write(&self.path, contents).map_err(|e| SettingsError::Io(e.to_string()))?;

        *cached = updated;
        Ok(())
    }
}

//! Controller configuration
//!
//! Supplied by the hosting process. Everything has a sensible default so
//! an empty JSON object is a valid configuration.

use crate::ambient::AirplanePolicy;
use crate::profile::{ProfileId, ProfileRegistry, SUPPORTED_PROFILES};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default deadline for a start or stop phase to converge
pub const DEFAULT_CONVERGENCE_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigError {
    #[error("Profile registry cannot be empty")]
    EmptyRegistry,

    #[error("Profile {0} is listed more than once")]
    DuplicateProfile(ProfileId),

    #[error("Convergence timeout must be greater than zero")]
    ZeroTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Profiles to manage, in start order
    pub profiles: Vec<ProfileId>,

    /// Deadline for a start/stop phase; `None` waits forever
    pub convergence_timeout_ms: Option<u64>,

    /// Comma separated radios affected by airplane mode.
    /// Absent means every radio is affected.
    pub airplane_mode_radios: Option<String>,

    /// Comma separated radios the user may re-enable during airplane mode
    pub airplane_toggleable_radios: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            profiles: SUPPORTED_PROFILES.to_vec(),
            convergence_timeout_ms: Some(DEFAULT_CONVERGENCE_TIMEOUT_MS),
            airplane_mode_radios: None,
            airplane_toggleable_radios: None,
        }
    }
}

impl ControllerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.convergence_timeout_ms == Some(0) {
            return Err(ConfigError::ZeroTimeout);
        }

        self.registry().map(|_| ())
    }

    pub fn registry(&self) -> Result<ProfileRegistry, ConfigError> {
        ProfileRegistry::new(self.profiles.clone())
    }

    pub fn convergence_timeout(&self) -> Option<Duration> {
        self.convergence_timeout_ms.map(Duration::from_millis)
    }

    pub fn airplane_policy(&self) -> AirplanePolicy {
        AirplanePolicy::from_radio_lists(
            self.airplane_mode_radios.as_deref(),
            self.airplane_toggleable_radios.as_deref(),
        )
    }
}

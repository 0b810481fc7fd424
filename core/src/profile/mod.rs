//! Profile services and their lifecycle bookkeeping
//!
//! A profile service (audio gateway, audio sink, input device, health
//! device, network profile) is an independently managed component that
//! needs the adapter to be on. This module holds:
//! - the closed set of profile identifiers and their lifecycle states
//! - the ordered registry that fixes start and stop order
//! - the mutex-guarded tracker that aggregates profile reports
//! - the fire-and-forget service trait and the reporting handle

pub mod registry;
pub mod service;
pub mod tracker;

pub use registry::{ProfileRegistry, SUPPORTED_PROFILES};
pub use service::{ProfileReporter, ProfileService, ProfileServices};
pub use tracker::ProfileLifecycleTracker;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of a profile service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileId {
    /// Hands-free / headset audio gateway
    Headset,
    /// Advanced audio distribution (media sink)
    A2dp,
    /// Human interface devices (keyboards, mice)
    Hid,
    /// Health device profile
    Health,
    /// Personal area networking
    Pan,
}

impl ProfileId {
    /// Every identifier, in declaration order
    pub const ALL: [ProfileId; 5] = [
        ProfileId::Headset,
        ProfileId::A2dp,
        ProfileId::Hid,
        ProfileId::Health,
        ProfileId::Pan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileId::Headset => "headset",
            ProfileId::A2dp => "a2dp",
            ProfileId::Hid => "hid",
            ProfileId::Health => "health",
            ProfileId::Pan => "pan",
        }
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown profile identifier: {0}")]
pub struct UnknownProfileName(pub String);

impl FromStr for ProfileId {
    type Err = UnknownProfileName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        ProfileId::ALL
            .into_iter()
            .find(|id| id.as_str() == needle)
            .ok_or_else(|| UnknownProfileName(s.to_string()))
    }
}

/// Lifecycle state of a single profile service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProfileState {
    Off,
    TurningOn,
    On,
    TurningOff,
}

impl ProfileState {
    /// Running, or on its way there
    pub fn is_active(&self) -> bool {
        matches!(self, ProfileState::On | ProfileState::TurningOn)
    }
}

impl fmt::Display for ProfileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileState::Off => write!(f, "Off"),
            ProfileState::TurningOn => write!(f, "TurningOn"),
            ProfileState::On => write!(f, "On"),
            ProfileState::TurningOff => write!(f, "TurningOff"),
        }
    }
}

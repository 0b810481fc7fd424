//! Ordered registry of supported profile services
//!
//! Start order is the declared order; stop order is its exact reverse.

use super::ProfileId;
use crate::config::ConfigError;
use std::sync::Arc;

/// Profiles started in order of appearance
pub const SUPPORTED_PROFILES: [ProfileId; 5] = [
    ProfileId::Headset,
    ProfileId::A2dp,
    ProfileId::Hid,
    ProfileId::Health,
    ProfileId::Pan,
];

/// Immutable, cheaply cloneable ordered list of profiles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRegistry {
    profiles: Arc<[ProfileId]>,
}

impl ProfileRegistry {
    /// Build a registry from a declared order.
    ///
    /// The list must be non-empty and free of duplicates.
    pub fn new(profiles: Vec<ProfileId>) -> Result<Self, ConfigError> {
        if profiles.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }

        for (i, id) in profiles.iter().enumerate() {
            if profiles[..i].contains(id) {
                return Err(ConfigError::DuplicateProfile(*id));
            }
        }

        Ok(Self {
            profiles: profiles.into(),
        })
    }

    pub fn start_order(&self) -> impl DoubleEndedIterator<Item = ProfileId> + '_ {
        self.profiles.iter().copied()
    }

    pub fn stop_order(&self) -> impl Iterator<Item = ProfileId> + '_ {
        self.profiles.iter().rev().copied()
    }

    pub fn contains(&self, id: ProfileId) -> bool {
        self.profiles.contains(&id)
    }

    /// Position of a profile in start order
    pub fn position(&self, id: ProfileId) -> Option<usize> {
        self.profiles.iter().position(|p| *p == id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn as_slice(&self) -> &[ProfileId] {
        &self.profiles
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self {
            profiles: SUPPORTED_PROFILES.to_vec().into(),
        }
    }
}

//! Profile lifecycle tracker
//!
//! Records the last known state of every commanded profile and answers
//! aggregate questions ("are they all on?", "are they all off?").
//!
//! Locking discipline: the table lock is only held for the duration of a
//! single read or write. Callers never issue commands while holding it.

use super::{ProfileId, ProfileRegistry, ProfileState};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Mutex-guarded profile state table.
///
/// Entries are created lazily by the first start command and are never
/// removed, so a restarted controller can resynchronize against it.
/// Entries are kept in registry order.
pub struct ProfileLifecycleTracker {
    registry: ProfileRegistry,
    table: Mutex<Vec<(ProfileId, ProfileState)>>,
}

impl ProfileLifecycleTracker {
    pub fn new(registry: ProfileRegistry) -> Self {
        Self {
            registry,
            table: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &ProfileRegistry {
        &self.registry
    }

    /// Record a state reported by a profile service.
    ///
    /// Returns true only when the recorded state actually changed.
    /// Reports for profiles outside the registry, or for profiles that
    /// were never commanded, are discarded.
    pub fn report(&self, profile: ProfileId, new_state: ProfileState) -> bool {
        if !self.registry.contains(profile) {
            warn!("Discarding report from unknown profile {}: {}", profile, new_state);
            return false;
        }

        let mut table = self.table.lock();
        match table.iter_mut().find(|(id, _)| *id == profile) {
            Some((_, state)) if *state != new_state => {
                debug!("Profile {} state {} -> {}", profile, state, new_state);
                *state = new_state;
                true
            }
            Some(_) => false,
            None => {
                debug!("Ignoring report from uncommanded profile {}: {}", profile, new_state);
                false
            }
        }
    }

    /// Optimistically mark a profile as starting.
    ///
    /// Only an absent or Off entry may be started.
    pub fn begin_start(&self, profile: ProfileId) -> bool {
        let Some(position) = self.registry.position(profile) else {
            return false;
        };

        let mut table = self.table.lock();
        match table.iter_mut().find(|(id, _)| *id == profile) {
            Some((_, state)) if *state == ProfileState::Off => {
                *state = ProfileState::TurningOn;
                true
            }
            Some((_, state)) => {
                warn!("Unable to start profile {}: invalid state {}", profile, state);
                false
            }
            None => {
                // keep registry order regardless of command order
                let index = table
                    .iter()
                    .position(|(id, _)| self.registry.position(*id) > Some(position))
                    .unwrap_or(table.len());
                table.insert(index, (profile, ProfileState::TurningOn));
                true
            }
        }
    }

    /// Optimistically mark a running profile as stopping.
    pub fn begin_stop(&self, profile: ProfileId) -> bool {
        let mut table = self.table.lock();
        match table.iter_mut().find(|(id, _)| *id == profile) {
            Some((_, state)) if *state == ProfileState::On => {
                *state = ProfileState::TurningOff;
                true
            }
            other => {
                warn!(
                    "Unable to stop profile {}: invalid state {:?}",
                    profile,
                    other.map(|(_, s)| *s)
                );
                false
            }
        }
    }

    /// True iff every tracked profile is in `target`
    pub fn all_profiles_at(&self, target: ProfileState) -> bool {
        self.table.lock().iter().all(|(_, state)| *state == target)
    }

    /// True if any tracked profile is on or turning on
    pub fn any_active(&self) -> bool {
        self.table.lock().iter().any(|(_, state)| state.is_active())
    }

    pub fn state(&self, profile: ProfileId) -> Option<ProfileState> {
        self.table
            .lock()
            .iter()
            .find(|(id, _)| *id == profile)
            .map(|(_, state)| *state)
    }

    /// Overwrite every tracked entry; used when a stalled stop is abandoned.
    pub fn force_all(&self, target: ProfileState) {
        for (_, state) in self.table.lock().iter_mut() {
            *state = target;
        }
    }

    pub fn snapshot(&self) -> Vec<(ProfileId, ProfileState)> {
        self.table.lock().clone()
    }
}

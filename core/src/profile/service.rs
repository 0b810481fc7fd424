//! Profile service seam and the reporting boundary
//!
//! Commands to profile services are fire-and-forget. A service confirms
//! its transitions later, from whatever thread it runs on, through a
//! [`ProfileReporter`].

use super::{ProfileId, ProfileLifecycleTracker, ProfileState};
use crate::lifecycle::Event;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// A lifecycle-managed profile service.
///
/// Implementations must return promptly; the actual work happens on the
/// service's own execution context and is confirmed via `reporter`.
pub trait ProfileService: Send + Sync {
    fn start(&self, reporter: ProfileReporter);
    fn stop(&self, reporter: ProfileReporter);
}

/// Profile services keyed by identifier
#[derive(Clone, Default)]
pub struct ProfileServices {
    services: HashMap<ProfileId, Arc<dyn ProfileService>>,
}

impl ProfileServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: ProfileId, service: Arc<dyn ProfileService>) -> Self {
        self.insert(id, service);
        self
    }

    pub fn insert(&mut self, id: ProfileId, service: Arc<dyn ProfileService>) {
        self.services.insert(id, service);
    }

    pub fn get(&self, id: ProfileId) -> Option<&Arc<dyn ProfileService>> {
        self.services.get(&id)
    }

    pub fn contains(&self, id: ProfileId) -> bool {
        self.services.contains_key(&id)
    }
}

/// Thread-safe handle profile services use to report lifecycle changes.
///
/// The report is recorded in the tracker first; only a real change is
/// forwarded to the controller mailbox as a single event.
#[derive(Clone)]
pub struct ProfileReporter {
    tracker: Arc<ProfileLifecycleTracker>,
    mailbox: mpsc::UnboundedSender<Event>,
}

impl ProfileReporter {
    pub(crate) fn new(
        tracker: Arc<ProfileLifecycleTracker>,
        mailbox: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self { tracker, mailbox }
    }

    /// Report a profile's new state. Returns true if it changed anything.
    pub fn report(&self, profile: ProfileId, state: ProfileState) -> bool {
        if !self.tracker.report(profile, state) {
            return false;
        }

        if self
            .mailbox
            .send(Event::ProfileReported { profile, state })
            .is_err()
        {
            debug!("Controller gone, dropping report {} -> {}", profile, state);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileRegistry;

    #[test]
    fn test_only_changes_are_forwarded() {
        let tracker = Arc::new(ProfileLifecycleTracker::new(ProfileRegistry::default()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = ProfileReporter::new(Arc::clone(&tracker), tx);

        tracker.begin_start(ProfileId::Pan);
        assert!(reporter.report(ProfileId::Pan, ProfileState::On));
        assert!(!reporter.report(ProfileId::Pan, ProfileState::On));

        assert!(matches!(
            rx.try_recv(),
            Ok(Event::ProfileReported {
                profile: ProfileId::Pan,
                state: ProfileState::On
            })
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_report_survives_closed_mailbox() {
        let tracker = Arc::new(ProfileLifecycleTracker::new(ProfileRegistry::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let reporter = ProfileReporter::new(Arc::clone(&tracker), tx);

        tracker.begin_start(ProfileId::Hid);
        assert!(reporter.report(ProfileId::Hid, ProfileState::On));
        assert_eq!(tracker.state(ProfileId::Hid), Some(ProfileState::On));
    }
}

//! Adapter state machine
//!
//! `handle` maps (state, event) to the commands the controller task must
//! run. It never performs I/O itself; the only shared state it touches is
//! the profile tracker, whose lock is released before `handle` returns.
//!
//! Pending flags:
//! - `start_pending` is set from the start request until every profile
//!   reports On (or a stop converges first).
//! - `stop_pending` is set from the stop request until every profile
//!   reports Off. It takes precedence: while it is set, start convergence
//!   is never announced.

use super::{AdapterState, Event, LifecycleEvent, StartSource, StopReason};
use crate::ambient::AirplanePolicy;
use crate::profile::{ProfileId, ProfileLifecycleTracker, ProfileState};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Which ambient transition the controller is listening for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbientWatch {
    /// Adapter is On; the condition switching on stops it
    Active,
    /// Adapter was stopped by the condition; switching off restores it
    Restore,
}

/// Side effects requested by the state machine, run in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartProfile(ProfileId),
    StopProfile(ProfileId),
    PersistRadioOn(bool),
    WatchAmbient(AmbientWatch),
    UnwatchAmbient,
    ArmDeadline { generation: u64 },
    Publish(LifecycleEvent),
    /// Release native resources and end the controller run
    Finalize,
}

pub struct AdapterStateMachine {
    state: AdapterState,
    start_pending: bool,
    stop_pending: bool,
    stop_reason: Option<StopReason>,
    /// Profiles still turning on when the stop began
    deferred_stops: Vec<ProfileId>,
    tracker: Arc<ProfileLifecycleTracker>,
    policy: AirplanePolicy,
    radio_should_be_on: bool,
    airplane_on: bool,
    ambient_watch: Option<AmbientWatch>,
    /// Bumped on every phase change; stale deadlines carry an old value
    generation: u64,
    finalized: bool,
}

impl AdapterStateMachine {
    pub fn new(
        tracker: Arc<ProfileLifecycleTracker>,
        policy: AirplanePolicy,
        radio_should_be_on: bool,
        airplane_on: bool,
    ) -> Self {
        Self {
            state: AdapterState::Off,
            start_pending: false,
            stop_pending: false,
            stop_reason: None,
            deferred_stops: Vec::new(),
            tracker,
            policy,
            radio_should_be_on,
            airplane_on,
            ambient_watch: None,
            generation: 0,
            finalized: false,
        }
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    pub fn start_pending(&self) -> bool {
        self.start_pending
    }

    pub fn stop_pending(&self) -> bool {
        self.stop_pending
    }

    pub fn radio_should_be_on(&self) -> bool {
        self.radio_should_be_on
    }

    pub fn ambient_watch(&self) -> Option<AmbientWatch> {
        self.ambient_watch
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn handle(&mut self, event: Event) -> Vec<Command> {
        let mut out = Vec::new();

        if self.finalized {
            debug!("Ignoring {:?} after finalize", event);
            return out;
        }

        match event {
            Event::StartRequested { source } => self.on_start_requested(source, &mut out),
            Event::StopRequested { reason } => self.on_stop_requested(reason, &mut out),
            Event::ProfileReported { profile, state } => {
                self.on_profile_reported(profile, state, &mut out)
            }
            Event::AmbientChanged(on) => self.on_ambient_changed(on, &mut out),
            Event::AmbientBaseline(on) => self.on_ambient_baseline(on, &mut out),
            Event::DeadlineElapsed { generation } => self.on_deadline(generation, &mut out),
        }

        out
    }

    fn on_start_requested(&mut self, source: StartSource, out: &mut Vec<Command>) {
        if self.stop_pending {
            warn!("Start request ignored: stop in progress");
            return;
        }

        if source == StartSource::User {
            self.radio_should_be_on = true;
            out.push(Command::PersistRadioOn(true));
        }

        match self.state {
            AdapterState::Off => self.begin_start(out),
            state => debug!("Start request ignored in state {}", state),
        }
    }

    fn on_stop_requested(&mut self, reason: StopReason, out: &mut Vec<Command>) {
        if let StopReason::User { persist: true } = reason {
            self.radio_should_be_on = false;
            out.push(Command::PersistRadioOn(false));
        }

        if self.stop_pending {
            // an explicit disable turns a parking stop into a final one
            if reason.finalizes() && self.stop_reason == Some(StopReason::Ambient) {
                info!("Pending ambient stop will finalize ({:?})", reason);
                self.stop_reason = Some(reason);
            } else {
                debug!("Stop request ignored: stop already pending");
            }
            return;
        }

        match self.state {
            AdapterState::TurningOn | AdapterState::On => self.begin_stop(reason, out),
            AdapterState::Off if matches!(reason, StopReason::User { .. }) => {
                info!("Stop requested while off, nothing to tear down");
                self.finalize(out);
            }
            state => debug!("Stop request ({:?}) ignored in state {}", reason, state),
        }
    }

    fn on_profile_reported(
        &mut self,
        profile: ProfileId,
        state: ProfileState,
        out: &mut Vec<Command>,
    ) {
        if !self.tracker.registry().contains(profile) {
            warn!("Report from unknown profile {} discarded", profile);
            return;
        }

        if self.stop_pending {
            if state == ProfileState::On {
                if let Some(index) = self.deferred_stops.iter().position(|p| *p == profile) {
                    self.deferred_stops.remove(index);
                    if self.tracker.begin_stop(profile) {
                        debug!("Stopping profile {} after deferred start", profile);
                        out.push(Command::StopProfile(profile));
                    }
                }
            } else if state == ProfileState::Off {
                self.deferred_stops.retain(|p| *p != profile);
            }

            debug!("Checking if all profiles are stopped...");
            if self.tracker.all_profiles_at(ProfileState::Off) {
                self.finish_stop(out);
            }
        } else if self.start_pending {
            debug!("Checking if all profiles are running...");
            if self.tracker.all_profiles_at(ProfileState::On) {
                self.finish_start(out);
            }
        } else {
            debug!("Unsolicited report {} -> {}", profile, state);
        }
    }

    fn on_ambient_changed(&mut self, on: bool, out: &mut Vec<Command>) {
        let was_on = std::mem::replace(&mut self.airplane_on, on);
        if was_on == on {
            return;
        }

        match (self.ambient_watch, on) {
            (Some(AmbientWatch::Active), true) if self.state == AdapterState::On => {
                info!("Airplane mode on, turning radio off");
                self.begin_stop(StopReason::Ambient, out);
            }
            (Some(AmbientWatch::Restore), false)
                if self.state == AdapterState::Off && self.radio_should_be_on =>
            {
                info!("Airplane mode off, restoring radio");
                self.begin_start(out);
            }
            _ => debug!(
                "Airplane mode {} ignored in state {}",
                if on { "on" } else { "off" },
                self.state
            ),
        }
    }

    fn on_ambient_baseline(&mut self, on: bool, out: &mut Vec<Command>) {
        self.airplane_on = on;

        match (self.ambient_watch, on) {
            (Some(AmbientWatch::Active), true)
                if self.state == AdapterState::On && !self.policy.toggleable =>
            {
                info!("Airplane mode already on, turning radio off");
                self.begin_stop(StopReason::Ambient, out);
            }
            (Some(AmbientWatch::Restore), false)
                if self.state == AdapterState::Off && self.radio_should_be_on =>
            {
                info!("Airplane mode already off, restoring radio");
                self.begin_start(out);
            }
            _ => {}
        }
    }

    fn on_deadline(&mut self, generation: u64, out: &mut Vec<Command>) {
        if generation != self.generation {
            return;
        }

        match self.state {
            AdapterState::TurningOn => {
                error!(
                    "Profiles did not start in time, stopping: {:?}",
                    self.tracker.snapshot()
                );
                self.begin_stop(StopReason::StartTimedOut, out);
            }
            AdapterState::TurningOff => {
                error!(
                    "Profiles did not stop in time, abandoning: {:?}",
                    self.tracker.snapshot()
                );
                self.tracker.force_all(ProfileState::Off);
                self.finish_stop(out);
            }
            _ => {}
        }
    }

    fn begin_start(&mut self, out: &mut Vec<Command>) {
        info!("Starting profile services");
        self.start_pending = true;
        self.stop_reason = None;
        self.unwatch_ambient(out);
        self.set_state(AdapterState::TurningOn, out);
        self.arm_deadline(out);

        let registry = self.tracker.registry().clone();
        for profile in registry.start_order() {
            if self.tracker.begin_start(profile) {
                debug!("Starting profile service {}", profile);
                out.push(Command::StartProfile(profile));
            }
        }

        // nothing left to wait for
        if self.tracker.all_profiles_at(ProfileState::On) {
            self.finish_start(out);
        }
    }

    fn finish_start(&mut self, out: &mut Vec<Command>) {
        info!("All profile services started");
        self.start_pending = false;
        self.generation += 1;

        if self.policy.sensitive {
            self.ambient_watch = Some(AmbientWatch::Active);
            out.push(Command::WatchAmbient(AmbientWatch::Active));
        }

        self.set_state(AdapterState::On, out);
        out.push(Command::Publish(LifecycleEvent::Started));
    }

    fn begin_stop(&mut self, reason: StopReason, out: &mut Vec<Command>) {
        info!("Stopping profile services ({:?})", reason);
        self.stop_pending = true;
        self.stop_reason = Some(reason);
        self.unwatch_ambient(out);
        self.set_state(AdapterState::TurningOff, out);
        self.arm_deadline(out);

        if !self.tracker.any_active() {
            self.finish_stop(out);
            return;
        }

        let registry = self.tracker.registry().clone();
        for profile in registry.stop_order() {
            match self.tracker.state(profile) {
                Some(ProfileState::On) => {
                    if self.tracker.begin_stop(profile) {
                        debug!("Stopping profile service {}", profile);
                        out.push(Command::StopProfile(profile));
                    }
                }
                Some(ProfileState::TurningOn) => {
                    debug!("Profile {} still starting, stop deferred", profile);
                    self.deferred_stops.push(profile);
                }
                _ => {}
            }
        }
    }

    fn finish_stop(&mut self, out: &mut Vec<Command>) {
        info!("All profile services stopped");
        let reason = self
            .stop_reason
            .take()
            .unwrap_or(StopReason::User { persist: false });

        self.stop_pending = false;
        self.start_pending = false;
        self.deferred_stops.clear();
        self.generation += 1;

        if !reason.finalizes() && self.policy.sensitive {
            self.ambient_watch = Some(AmbientWatch::Restore);
            out.push(Command::WatchAmbient(AmbientWatch::Restore));
        }

        self.set_state(AdapterState::Off, out);
        out.push(Command::Publish(LifecycleEvent::Stopped));

        if reason.finalizes() {
            self.finalize(out);
        }
    }

    fn finalize(&mut self, out: &mut Vec<Command>) {
        self.finalized = true;
        self.unwatch_ambient(out);
        out.push(Command::Finalize);
    }

    fn unwatch_ambient(&mut self, out: &mut Vec<Command>) {
        if self.ambient_watch.take().is_some() {
            out.push(Command::UnwatchAmbient);
        }
    }

    fn arm_deadline(&mut self, out: &mut Vec<Command>) {
        self.generation += 1;
        out.push(Command::ArmDeadline {
            generation: self.generation,
        });
    }

    fn set_state(&mut self, state: AdapterState, out: &mut Vec<Command>) {
        if self.state != state {
            debug!("Adapter state {} -> {}", self.state, state);
            self.state = state;
            out.push(Command::Publish(LifecycleEvent::StateChanged(state)));
        }
    }
}

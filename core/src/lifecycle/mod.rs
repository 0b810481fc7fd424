//! Adapter lifecycle orchestration
//!
//! [`AdapterStateMachine`] decides, [`controller`] executes. All adapter
//! events go through a single mailbox consumed by one task, so the
//! adapter state and the pending flags need no locks.

pub mod controller;
pub mod state_machine;

pub use controller::{spawn_controller, Collaborators, ControllerError, ControllerHandle};
pub use state_machine::{AdapterStateMachine, AmbientWatch, Command};

use crate::profile::{ProfileId, ProfileState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall adapter state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdapterState {
    Off,
    TurningOn,
    On,
    TurningOff,
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterState::Off => write!(f, "Off"),
            AdapterState::TurningOn => write!(f, "TurningOn"),
            AdapterState::On => write!(f, "On"),
            AdapterState::TurningOff => write!(f, "TurningOff"),
        }
    }
}

/// Who asked for the adapter to come up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartSource {
    /// Explicit enable through the control surface; persisted
    User,
    /// Ambient condition cleared; not persisted
    Ambient,
}

/// Why the adapter is going down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Explicit disable through the control surface
    User { persist: bool },
    /// Ambient condition (airplane mode) switched on
    Ambient,
    /// Start phase missed its convergence deadline
    StartTimedOut,
}

impl StopReason {
    /// Whether reaching Off ends this run of the controller
    pub fn finalizes(&self) -> bool {
        !matches!(self, StopReason::Ambient)
    }
}

/// Everything the controller mailbox accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StartRequested { source: StartSource },
    StopRequested { reason: StopReason },
    /// A profile's recorded state changed; the tracker is already updated
    ProfileReported { profile: ProfileId, state: ProfileState },
    AmbientChanged(bool),
    /// Condition value observed when a watch was armed; not a transition
    AmbientBaseline(bool),
    DeadlineElapsed { generation: u64 },
}

/// Lifecycle notifications published to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    StateChanged(AdapterState),
    /// Every profile reported On
    Started,
    /// Every profile reported Off
    Stopped,
    /// Native resources released; the controller task has exited
    Finalized,
}

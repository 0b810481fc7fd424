//! Ambient conditions that can force the radio off
//!
//! The only condition modelled is airplane mode. Whether the adapter reacts
//! to it at all is decided by the configured radio lists, the same way the
//! platform's airplane mode settings name the radios they affect.

use std::sync::Arc;
use tokio::sync::watch;

/// Radio name looked up in the airplane mode radio lists
pub const RADIO_BLUETOOTH: &str = "bluetooth";

/// How the adapter responds to airplane mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AirplanePolicy {
    /// Airplane mode turns the adapter off
    pub sensitive: bool,
    /// The user may turn the adapter back on while airplane mode is on
    pub toggleable: bool,
}

impl AirplanePolicy {
    pub fn from_radio_lists(radios: Option<&str>, toggleable: Option<&str>) -> Self {
        Self {
            sensitive: radios.map_or(true, |list| lists_radio(list, RADIO_BLUETOOTH)),
            toggleable: toggleable.map_or(false, |list| lists_radio(list, RADIO_BLUETOOTH)),
        }
    }
}

impl Default for AirplanePolicy {
    fn default() -> Self {
        Self::from_radio_lists(None, None)
    }
}

fn lists_radio(list: &str, radio: &str) -> bool {
    list.split(',').any(|entry| entry.trim().eq_ignore_ascii_case(radio))
}

/// An external boolean condition the controller can subscribe to
pub trait AmbientCondition: Send + Sync {
    /// Current value of the condition
    fn current(&self) -> bool;

    /// Fresh subscription; dropping the receiver unsubscribes
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Settable airplane mode flag backed by a watch channel
#[derive(Clone)]
pub struct AirplaneModeSwitch {
    tx: Arc<watch::Sender<bool>>,
}

impl AirplaneModeSwitch {
    pub fn new(initial: bool) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Flip airplane mode. Returns the previous value.
    pub fn set(&self, on: bool) -> bool {
        self.tx.send_replace(on)
    }
}

impl Default for AirplaneModeSwitch {
    fn default() -> Self {
        Self::new(false)
    }
}

impl AmbientCondition for AirplaneModeSwitch {
    fn current(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

// Simulated radio stack for running the controller without hardware
//
// Profiles confirm each command after a fixed delay on their own task.
// The gateway answers property requests from an in-memory table, and
// pairs with any address on request.

use parking_lot::Mutex;
use radiod_core::{
    BdAddr, BondState, NativeRadioGateway, ProfileId, ProfileReporter, ProfileService,
    ProfileState, PropertyId, PropertySink, PropertyValue, ScanMode,
};
use std::time::Duration;
use tracing::{debug, info};

pub struct SimulatedProfile {
    id: ProfileId,
    delay: Duration,
}

impl SimulatedProfile {
    pub fn new(id: ProfileId, delay: Duration) -> Self {
        Self { id, delay }
    }

    fn confirm(&self, reporter: ProfileReporter, state: ProfileState) {
        let id = self.id;
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("Profile {} reached {}", id, state);
            reporter.report(id, state);
        });
    }
}

impl ProfileService for SimulatedProfile {
    fn start(&self, reporter: ProfileReporter) {
        self.confirm(reporter, ProfileState::On);
    }

    fn stop(&self, reporter: ProfileReporter) {
        self.confirm(reporter, ProfileState::Off);
    }
}

struct GatewayState {
    sink: Option<PropertySink>,
    name: String,
    scan_mode: ScanMode,
    discoverable_timeout: u32,
}

pub struct LoopbackGateway {
    address: BdAddr,
    state: Mutex<GatewayState>,
}

impl LoopbackGateway {
    pub fn new(address: BdAddr, name: impl Into<String>) -> Self {
        Self {
            address,
            state: Mutex::new(GatewayState {
                sink: None,
                name: name.into(),
                scan_mode: ScanMode::None,
                discoverable_timeout: 120,
            }),
        }
    }
}

impl NativeRadioGateway for LoopbackGateway {
    fn initialize(&self, callbacks: PropertySink) -> bool {
        info!("Loopback radio initialized ({})", self.address);
        self.state.lock().sink = Some(callbacks);
        true
    }

    fn teardown(&self) {
        info!("Loopback radio torn down");
        self.state.lock().sink = None;
    }

    fn request_property_read(&self, id: PropertyId) -> bool {
        let state = self.state.lock();
        let Some(sink) = &state.sink else {
            return false;
        };

        let value = match id {
            PropertyId::Address => PropertyValue::Address(self.address),
            PropertyId::Name => PropertyValue::Name(state.name.clone()),
            PropertyId::ScanMode => PropertyValue::ScanMode(state.scan_mode),
            PropertyId::DiscoverableTimeout => {
                PropertyValue::DiscoverableTimeout(state.discoverable_timeout)
            }
        };
        sink.property_changed(value);
        true
    }

    fn request_property_write(&self, value: PropertyValue) -> bool {
        let mut state = self.state.lock();
        if state.sink.is_none() {
            return false;
        }

        match &value {
            // read-only
            PropertyValue::Address(_) => return false,
            PropertyValue::Name(name) => state.name = name.clone(),
            PropertyValue::ScanMode(mode) => state.scan_mode = *mode,
            PropertyValue::DiscoverableTimeout(secs) => state.discoverable_timeout = *secs,
        }

        if let Some(sink) = &state.sink {
            sink.property_changed(value);
        }
        true
    }

    fn start_discovery(&self) -> bool {
        self.notify(|sink| sink.discovery_changed(true))
    }

    fn cancel_discovery(&self) -> bool {
        self.notify(|sink| sink.discovery_changed(false))
    }

    fn create_bond(&self, addr: BdAddr) -> bool {
        self.notify(|sink| {
            info!("Pairing with {}", addr);
            sink.bond_state_changed(addr, BondState::Bonding);
            sink.bond_state_changed(addr, BondState::Bonded);
        })
    }

    fn cancel_bond(&self, addr: BdAddr) -> bool {
        // pairing completes inside create_bond, nothing is ever in flight
        self.notify(|_| debug!("No pairing with {} in progress", addr))
    }

    fn remove_bond(&self, addr: BdAddr) -> bool {
        self.notify(|sink| sink.bond_state_changed(addr, BondState::None))
    }
}

impl LoopbackGateway {
    fn notify(&self, f: impl FnOnce(&PropertySink)) -> bool {
        match &self.state.lock().sink {
            Some(sink) => {
                f(sink);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radiod_core::AdapterProperties;
    use std::sync::Arc;

    #[test]
    fn test_loopback_reports_reads_and_writes() {
        let gateway = LoopbackGateway::new(BdAddr([0, 1, 2, 3, 4, 5]), "bench");
        assert!(!gateway.request_property_read(PropertyId::Name));

        let properties = Arc::new(AdapterProperties::new());
        assert!(gateway.initialize(PropertySink::new(Arc::clone(&properties))));

        assert!(gateway.request_property_read(PropertyId::Address));
        assert_eq!(properties.address(), Some(BdAddr([0, 1, 2, 3, 4, 5])));

        assert!(gateway.request_property_write(PropertyValue::Name("den".to_string())));
        assert_eq!(properties.name().as_deref(), Some("den"));

        assert!(!gateway.request_property_write(PropertyValue::Address(BdAddr([9; 6]))));

        gateway.teardown();
        assert!(!gateway.request_property_write(PropertyValue::ScanMode(ScanMode::Connectable)));
    }

    #[test]
    fn test_loopback_pairs_and_discovers() {
        let gateway = LoopbackGateway::new(BdAddr([0, 1, 2, 3, 4, 5]), "bench");
        let phone = BdAddr([0x40, 0, 0, 0, 0, 7]);
        assert!(!gateway.create_bond(phone));

        let properties = Arc::new(AdapterProperties::new());
        assert!(gateway.initialize(PropertySink::new(Arc::clone(&properties))));

        assert!(gateway.start_discovery());
        assert!(properties.is_discovering());
        assert!(gateway.cancel_discovery());
        assert!(!properties.is_discovering());

        assert!(gateway.create_bond(phone));
        assert_eq!(properties.bond_state(phone), BondState::Bonded);
        assert!(gateway.remove_bond(phone));
        assert!(properties.bonded_devices().is_empty());
    }
}

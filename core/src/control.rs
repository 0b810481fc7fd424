//! Control surface exposed to callers
//!
//! Every operation checks the caller's credential first. Enable and
//! disable are forwarded to the controller mailbox and return as soon as
//! the request is queued; queries read the last published state.

use crate::ambient::{AirplanePolicy, AmbientCondition};
use crate::gateway::{
    AdapterProperties, BdAddr, BondState, ConnectionState, NativeRadioGateway, PropertyValue,
    ScanMode,
};
use crate::lifecycle::{AdapterState, Event, StartSource, StopReason};
use crate::profile::{ProfileId, ProfileLifecycleTracker, ProfileState};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Capability held by a caller. Higher levels include the lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Credential {
    Anonymous,
    /// May query state and use the adapter
    Use,
    /// May enable or disable the adapter, rename it, and manage pairing
    Admin,
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Anonymous => write!(f, "anonymous"),
            Credential::Use => write!(f, "use"),
            Credential::Admin => write!(f, "admin"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("Permission denied: {0} capability required")]
    PermissionDenied(Credential),

    #[error("Native radio gateway failure: {0}")]
    NativeGatewayFailure(String),

    #[error("Adapter controller is not running")]
    Unavailable,
}

#[derive(Clone)]
pub struct ControlSurface {
    mailbox: mpsc::UnboundedSender<Event>,
    state: watch::Receiver<AdapterState>,
    tracker: Arc<ProfileLifecycleTracker>,
    properties: Arc<AdapterProperties>,
    gateway: Arc<dyn NativeRadioGateway>,
    ambient: Arc<dyn AmbientCondition>,
    policy: AirplanePolicy,
}

impl ControlSurface {
    pub(crate) fn new(
        mailbox: mpsc::UnboundedSender<Event>,
        state: watch::Receiver<AdapterState>,
        tracker: Arc<ProfileLifecycleTracker>,
        properties: Arc<AdapterProperties>,
        gateway: Arc<dyn NativeRadioGateway>,
        ambient: Arc<dyn AmbientCondition>,
        policy: AirplanePolicy,
    ) -> Self {
        Self {
            mailbox,
            state,
            tracker,
            properties,
            gateway,
            ambient,
            policy,
        }
    }

    /// Ask the adapter to turn on and persist the preference.
    ///
    /// Returns `Ok(false)` when airplane mode is on and the adapter may not
    /// be toggled during it.
    pub fn request_enable(&self, credential: Credential) -> Result<bool, ControlError> {
        require(credential, Credential::Admin)?;

        if self.policy.sensitive && !self.policy.toggleable && self.ambient.current() {
            warn!("Enable refused: airplane mode is on");
            return Ok(false);
        }

        info!("Enable requested");
        self.send(Event::StartRequested {
            source: StartSource::User,
        })?;
        Ok(true)
    }

    /// Ask the adapter to turn off. With `persist` the preference is
    /// cleared so the adapter stays off across restarts.
    pub fn request_disable(
        &self,
        credential: Credential,
        persist: bool,
    ) -> Result<bool, ControlError> {
        require(credential, Credential::Admin)?;

        info!("Disable requested (persist: {})", persist);
        self.send(Event::StopRequested {
            reason: StopReason::User { persist },
        })?;
        Ok(true)
    }

    pub fn query_state(&self, credential: Credential) -> Result<AdapterState, ControlError> {
        require(credential, Credential::Use)?;
        Ok(*self.state.borrow())
    }

    pub fn is_enabled(&self, credential: Credential) -> Result<bool, ControlError> {
        Ok(self.query_state(credential)? == AdapterState::On)
    }

    /// Recorded state of one profile; Off for profiles never commanded
    pub fn query_profile_connection_state(
        &self,
        credential: Credential,
        profile: ProfileId,
    ) -> Result<ProfileState, ControlError> {
        require(credential, Credential::Use)?;
        Ok(self.tracker.state(profile).unwrap_or(ProfileState::Off))
    }

    pub fn address(&self, credential: Credential) -> Result<Option<BdAddr>, ControlError> {
        require(credential, Credential::Use)?;
        Ok(self.properties.address())
    }

    pub fn name(&self, credential: Credential) -> Result<Option<String>, ControlError> {
        require(credential, Credential::Use)?;
        Ok(self.properties.name())
    }

    /// Request a new adapter name; the cache updates when the stack confirms
    pub fn set_name(&self, credential: Credential, name: &str) -> Result<(), ControlError> {
        require(credential, Credential::Admin)?;
        self.write_property(PropertyValue::Name(name.to_string()))
    }

    pub fn scan_mode(&self, credential: Credential) -> Result<ScanMode, ControlError> {
        require(credential, Credential::Use)?;
        Ok(self.properties.scan_mode())
    }

    /// Seconds the adapter stays discoverable after entering that mode
    pub fn discoverable_timeout(&self, credential: Credential) -> Result<u32, ControlError> {
        require(credential, Credential::Use)?;
        Ok(self.properties.discoverable_timeout())
    }

    pub fn set_scan_mode(
        &self,
        credential: Credential,
        mode: ScanMode,
        discoverable_timeout_secs: u32,
    ) -> Result<(), ControlError> {
        require(credential, Credential::Use)?;
        self.write_property(PropertyValue::DiscoverableTimeout(discoverable_timeout_secs))?;
        self.write_property(PropertyValue::ScanMode(mode))
    }

    pub fn start_discovery(&self, credential: Credential) -> Result<(), ControlError> {
        require(credential, Credential::Admin)?;
        accepted(self.gateway.start_discovery(), "start discovery")
    }

    pub fn cancel_discovery(&self, credential: Credential) -> Result<(), ControlError> {
        require(credential, Credential::Admin)?;
        accepted(self.gateway.cancel_discovery(), "cancel discovery")
    }

    pub fn is_discovering(&self, credential: Credential) -> Result<bool, ControlError> {
        require(credential, Credential::Use)?;
        Ok(self.properties.is_discovering())
    }

    pub fn connection_state(
        &self,
        credential: Credential,
    ) -> Result<ConnectionState, ControlError> {
        require(credential, Credential::Use)?;
        Ok(self.properties.connection_state())
    }

    /// Start pairing with `addr`. Returns `Ok(false)` if the device is
    /// already bonded or bonding.
    pub fn create_bond(&self, credential: Credential, addr: BdAddr) -> Result<bool, ControlError> {
        require(credential, Credential::Admin)?;

        if self.properties.bond_state(addr) != BondState::None {
            warn!("Bond with {} already exists or is in progress", addr);
            return Ok(false);
        }

        info!("Bonding with {}", addr);
        accepted(self.gateway.create_bond(addr), "create bond")?;
        Ok(true)
    }

    pub fn cancel_bond_process(
        &self,
        credential: Credential,
        addr: BdAddr,
    ) -> Result<(), ControlError> {
        require(credential, Credential::Admin)?;
        accepted(self.gateway.cancel_bond(addr), "cancel bond")
    }

    /// Forget a bonded device. Returns `Ok(false)` unless it is bonded.
    pub fn remove_bond(&self, credential: Credential, addr: BdAddr) -> Result<bool, ControlError> {
        require(credential, Credential::Admin)?;

        if self.properties.bond_state(addr) != BondState::Bonded {
            return Ok(false);
        }

        info!("Removing bond with {}", addr);
        accepted(self.gateway.remove_bond(addr), "remove bond")?;
        Ok(true)
    }

    pub fn bond_state(
        &self,
        credential: Credential,
        addr: BdAddr,
    ) -> Result<BondState, ControlError> {
        require(credential, Credential::Use)?;
        Ok(self.properties.bond_state(addr))
    }

    pub fn bonded_devices(&self, credential: Credential) -> Result<Vec<BdAddr>, ControlError> {
        require(credential, Credential::Use)?;
        Ok(self.properties.bonded_devices())
    }

    fn write_property(&self, value: PropertyValue) -> Result<(), ControlError> {
        let id = value.id();
        let what = format!("write of {:?}", id);
        accepted(self.gateway.request_property_write(value), &what)
    }

    fn send(&self, event: Event) -> Result<(), ControlError> {
        self.mailbox
            .send(event)
            .map_err(|_| ControlError::Unavailable)
    }
}

fn accepted(accepted: bool, what: &str) -> Result<(), ControlError> {
    if accepted {
        Ok(())
    } else {
        error!("Native stack refused {}", what);
        Err(ControlError::NativeGatewayFailure(format!("{} refused", what)))
    }
}

fn require(held: Credential, needed: Credential) -> Result<(), ControlError> {
    if held >= needed {
        Ok(())
    } else {
        warn!("Permission denied: {} held, {} required", held, needed);
        Err(ControlError::PermissionDenied(needed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ambient::AirplaneModeSwitch;
    use crate::gateway::{PropertyId, PropertySink};
    use crate::profile::ProfileRegistry;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Request {
        StartDiscovery,
        CancelDiscovery,
        CreateBond(BdAddr),
        CancelBond(BdAddr),
        RemoveBond(BdAddr),
    }

    #[derive(Default)]
    struct RecordingGateway {
        refuse: bool,
        writes: Mutex<Vec<PropertyValue>>,
        requests: Mutex<Vec<Request>>,
    }

    impl RecordingGateway {
        fn record(&self, request: Request) -> bool {
            if self.refuse {
                return false;
            }
            self.requests.lock().push(request);
            true
        }
    }

    impl NativeRadioGateway for RecordingGateway {
        fn initialize(&self, _callbacks: PropertySink) -> bool {
            true
        }

        fn teardown(&self) {}

        fn request_property_read(&self, _id: PropertyId) -> bool {
            true
        }

        fn request_property_write(&self, value: PropertyValue) -> bool {
            if self.refuse {
                return false;
            }
            self.writes.lock().push(value);
            true
        }

        fn start_discovery(&self) -> bool {
            self.record(Request::StartDiscovery)
        }

        fn cancel_discovery(&self) -> bool {
            self.record(Request::CancelDiscovery)
        }

        fn create_bond(&self, addr: BdAddr) -> bool {
            self.record(Request::CreateBond(addr))
        }

        fn cancel_bond(&self, addr: BdAddr) -> bool {
            self.record(Request::CancelBond(addr))
        }

        fn remove_bond(&self, addr: BdAddr) -> bool {
            self.record(Request::RemoveBond(addr))
        }
    }

    struct Fixture {
        surface: ControlSurface,
        mailbox: mpsc::UnboundedReceiver<Event>,
        state: watch::Sender<AdapterState>,
        airplane: AirplaneModeSwitch,
        gateway: Arc<RecordingGateway>,
        sink: PropertySink,
    }

    fn fixture(policy: AirplanePolicy, gateway: RecordingGateway) -> Fixture {
        let (tx, mailbox) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(AdapterState::Off);
        let airplane = AirplaneModeSwitch::new(false);
        let gateway = Arc::new(gateway);
        let tracker = Arc::new(ProfileLifecycleTracker::new(ProfileRegistry::default()));
        let properties = Arc::new(AdapterProperties::new());

        let surface = ControlSurface::new(
            tx,
            state_rx,
            tracker,
            Arc::clone(&properties),
            gateway.clone(),
            Arc::new(airplane.clone()),
            policy,
        );

        Fixture {
            surface,
            mailbox,
            state,
            airplane,
            gateway,
            sink: PropertySink::new(properties),
        }
    }

    #[test]
    fn test_enable_requires_admin() {
        let mut f = fixture(AirplanePolicy::default(), RecordingGateway::default());

        assert_eq!(
            f.surface.request_enable(Credential::Use),
            Err(ControlError::PermissionDenied(Credential::Admin))
        );
        assert!(f.mailbox.try_recv().is_err());

        assert_eq!(f.surface.request_enable(Credential::Admin), Ok(true));
        assert_eq!(
            f.mailbox.try_recv().unwrap(),
            Event::StartRequested {
                source: StartSource::User
            }
        );
    }

    #[test]
    fn test_enable_refused_in_airplane_mode() {
        let mut f = fixture(AirplanePolicy::default(), RecordingGateway::default());
        f.airplane.set(true);

        assert_eq!(f.surface.request_enable(Credential::Admin), Ok(false));
        assert!(f.mailbox.try_recv().is_err());
    }

    #[test]
    fn test_enable_allowed_when_toggleable() {
        let policy = AirplanePolicy::from_radio_lists(None, Some("bluetooth"));
        let mut f = fixture(policy, RecordingGateway::default());
        f.airplane.set(true);

        assert_eq!(f.surface.request_enable(Credential::Admin), Ok(true));
        assert!(f.mailbox.try_recv().is_ok());
    }

    #[test]
    fn test_disable_forwards_persist_flag() {
        let mut f = fixture(AirplanePolicy::default(), RecordingGateway::default());

        f.surface.request_disable(Credential::Admin, false).unwrap();
        assert_eq!(
            f.mailbox.try_recv().unwrap(),
            Event::StopRequested {
                reason: StopReason::User { persist: false }
            }
        );
    }

    #[test]
    fn test_query_state_follows_published_state() {
        let f = fixture(AirplanePolicy::default(), RecordingGateway::default());

        assert_eq!(
            f.surface.query_state(Credential::Anonymous),
            Err(ControlError::PermissionDenied(Credential::Use))
        );
        assert_eq!(f.surface.query_state(Credential::Use), Ok(AdapterState::Off));

        f.state.send_replace(AdapterState::On);
        assert_eq!(f.surface.is_enabled(Credential::Use), Ok(true));
    }

    #[test]
    fn test_unknown_profile_reads_off() {
        let f = fixture(AirplanePolicy::default(), RecordingGateway::default());
        assert_eq!(
            f.surface
                .query_profile_connection_state(Credential::Use, ProfileId::Health),
            Ok(ProfileState::Off)
        );
    }

    #[test]
    fn test_set_scan_mode_writes_timeout_then_mode() {
        let f = fixture(AirplanePolicy::default(), RecordingGateway::default());

        f.surface
            .set_scan_mode(Credential::Use, ScanMode::ConnectableDiscoverable, 120)
            .unwrap();
        assert_eq!(
            *f.gateway.writes.lock(),
            vec![
                PropertyValue::DiscoverableTimeout(120),
                PropertyValue::ScanMode(ScanMode::ConnectableDiscoverable),
            ]
        );
    }

    #[test]
    fn test_refused_write_is_gateway_failure() {
        let gateway = RecordingGateway {
            refuse: true,
            ..Default::default()
        };
        let f = fixture(AirplanePolicy::default(), gateway);

        assert_eq!(
            f.surface.set_name(Credential::Use, "den"),
            Err(ControlError::PermissionDenied(Credential::Admin))
        );
        assert!(matches!(
            f.surface.set_name(Credential::Admin, "den"),
            Err(ControlError::NativeGatewayFailure(_))
        ));
    }

    #[test]
    fn test_discovery_requires_admin_to_change() {
        let f = fixture(AirplanePolicy::default(), RecordingGateway::default());

        assert_eq!(
            f.surface.start_discovery(Credential::Use),
            Err(ControlError::PermissionDenied(Credential::Admin))
        );
        f.surface.start_discovery(Credential::Admin).unwrap();
        assert_eq!(f.surface.is_discovering(Credential::Use), Ok(false));

        // state follows the stack's report, not the request
        f.sink.discovery_changed(true);
        assert_eq!(f.surface.is_discovering(Credential::Use), Ok(true));

        f.surface.cancel_discovery(Credential::Admin).unwrap();
        assert_eq!(
            *f.gateway.requests.lock(),
            vec![Request::StartDiscovery, Request::CancelDiscovery]
        );
        assert_eq!(
            f.surface.is_discovering(Credential::Anonymous),
            Err(ControlError::PermissionDenied(Credential::Use))
        );
    }

    #[test]
    fn test_create_bond_only_from_unbonded() {
        let f = fixture(AirplanePolicy::default(), RecordingGateway::default());
        let phone = BdAddr([0xAC, 0x37, 0x43, 0, 0, 1]);

        assert_eq!(f.surface.bond_state(Credential::Use, phone), Ok(BondState::None));
        assert_eq!(f.surface.create_bond(Credential::Admin, phone), Ok(true));

        f.sink.bond_state_changed(phone, BondState::Bonding);
        assert_eq!(f.surface.create_bond(Credential::Admin, phone), Ok(false));
        f.surface.cancel_bond_process(Credential::Admin, phone).unwrap();

        assert_eq!(
            *f.gateway.requests.lock(),
            vec![Request::CreateBond(phone), Request::CancelBond(phone)]
        );
    }

    #[test]
    fn test_remove_bond_only_when_bonded() {
        let f = fixture(AirplanePolicy::default(), RecordingGateway::default());
        let phone = BdAddr([0xAC, 0x37, 0x43, 0, 0, 1]);

        assert_eq!(f.surface.remove_bond(Credential::Admin, phone), Ok(false));
        assert!(f.gateway.requests.lock().is_empty());

        f.sink.bond_state_changed(phone, BondState::Bonded);
        assert_eq!(f.surface.bonded_devices(Credential::Use), Ok(vec![phone]));
        assert_eq!(
            f.surface.remove_bond(Credential::Use, phone),
            Err(ControlError::PermissionDenied(Credential::Admin))
        );
        assert_eq!(f.surface.remove_bond(Credential::Admin, phone), Ok(true));
        assert_eq!(*f.gateway.requests.lock(), vec![Request::RemoveBond(phone)]);
    }

    #[test]
    fn test_refused_bond_is_gateway_failure() {
        let gateway = RecordingGateway {
            refuse: true,
            ..Default::default()
        };
        let f = fixture(AirplanePolicy::default(), gateway);

        assert!(matches!(
            f.surface.create_bond(Credential::Admin, BdAddr([1; 6])),
            Err(ControlError::NativeGatewayFailure(_))
        ));
        assert!(matches!(
            f.surface.start_discovery(Credential::Admin),
            Err(ControlError::NativeGatewayFailure(_))
        ));
    }

    #[test]
    fn test_connection_state_reads_cache() {
        let f = fixture(AirplanePolicy::default(), RecordingGateway::default());
        assert_eq!(
            f.surface.connection_state(Credential::Use),
            Ok(ConnectionState::Disconnected)
        );

        f.sink.connection_state_changed(ConnectionState::Connecting);
        assert_eq!(
            f.surface.connection_state(Credential::Use),
            Ok(ConnectionState::Connecting)
        );
    }

    #[test]
    fn test_unavailable_after_controller_exit() {
        let f = fixture(AirplanePolicy::default(), RecordingGateway::default());
        drop(f.mailbox);

        assert_eq!(
            f.surface.request_disable(Credential::Admin, true),
            Err(ControlError::Unavailable)
        );
    }
}

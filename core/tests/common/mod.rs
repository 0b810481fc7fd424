//! Shared fixtures for the controller integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use radiod_core::{
    spawn_controller, AirplaneModeSwitch, BdAddr, BondState, Collaborators, ControlSurface,
    ControllerConfig, ControllerHandle, InMemorySettings, LifecycleEvent, NativeRadioGateway,
    ProfileId, ProfileReporter, ProfileService, ProfileServices, ProfileState, PropertyId,
    PropertySink, PropertyValue, SettingsStore,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Start(ProfileId),
    Stop(ProfileId),
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

/// Profile that logs every command and, in auto mode, confirms it from a
/// separate task
pub struct RecordingProfile {
    id: ProfileId,
    log: CallLog,
    auto: bool,
}

impl RecordingProfile {
    fn confirm(&self, reporter: ProfileReporter, state: ProfileState) {
        if !self.auto {
            return;
        }
        let id = self.id;
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            reporter.report(id, state);
        });
    }
}

impl ProfileService for RecordingProfile {
    fn start(&self, reporter: ProfileReporter) {
        self.log.lock().push(Call::Start(self.id));
        self.confirm(reporter, ProfileState::On);
    }

    fn stop(&self, reporter: ProfileReporter) {
        self.log.lock().push(Call::Stop(self.id));
        self.confirm(reporter, ProfileState::Off);
    }
}

#[derive(Default)]
pub struct CountingGateway {
    pub teardowns: AtomicUsize,
    sink: Mutex<Option<PropertySink>>,
}

impl NativeRadioGateway for CountingGateway {
    fn initialize(&self, callbacks: PropertySink) -> bool {
        *self.sink.lock() = Some(callbacks);
        true
    }

    fn teardown(&self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }

    fn request_property_read(&self, id: PropertyId) -> bool {
        if let (PropertyId::Name, Some(sink)) = (id, self.sink.lock().as_ref()) {
            sink.property_changed(PropertyValue::Name("bench".to_string()));
        }
        true
    }

    fn request_property_write(&self, value: PropertyValue) -> bool {
        match self.sink.lock().as_ref() {
            Some(sink) => {
                sink.property_changed(value);
                true
            }
            None => false,
        }
    }

    fn start_discovery(&self) -> bool {
        self.with_sink(|sink| sink.discovery_changed(true))
    }

    fn cancel_discovery(&self) -> bool {
        self.with_sink(|sink| sink.discovery_changed(false))
    }

    /// Pairs instantly
    fn create_bond(&self, addr: BdAddr) -> bool {
        self.with_sink(|sink| sink.bond_state_changed(addr, BondState::Bonded))
    }

    fn cancel_bond(&self, addr: BdAddr) -> bool {
        self.with_sink(|sink| sink.bond_state_changed(addr, BondState::None))
    }

    fn remove_bond(&self, addr: BdAddr) -> bool {
        self.with_sink(|sink| sink.bond_state_changed(addr, BondState::None))
    }
}

impl CountingGateway {
    fn with_sink(&self, f: impl FnOnce(&PropertySink)) -> bool {
        match self.sink.lock().as_ref() {
            Some(sink) => {
                f(sink);
                true
            }
            None => false,
        }
    }
}

pub struct Options {
    pub profiles: Vec<ProfileId>,
    pub auto: bool,
    pub radio_on: bool,
    pub airplane: bool,
    pub airplane_mode_radios: Option<String>,
    pub airplane_toggleable_radios: Option<String>,
    pub settings: Option<Arc<dyn SettingsStore>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            profiles: vec![ProfileId::Headset, ProfileId::A2dp, ProfileId::Hid],
            auto: true,
            radio_on: false,
            airplane: false,
            airplane_mode_radios: None,
            airplane_toggleable_radios: None,
            settings: None,
        }
    }
}

pub struct Harness {
    pub handle: ControllerHandle,
    pub control: ControlSurface,
    pub events: broadcast::Receiver<LifecycleEvent>,
    pub airplane: AirplaneModeSwitch,
    pub log: CallLog,
    pub settings: Arc<InMemorySettings>,
    pub gateway: Arc<CountingGateway>,
}

impl Harness {
    pub fn spawn(options: Options) -> Self {
        let log = CallLog::default();
        let mut profiles = ProfileServices::new();
        for id in &options.profiles {
            profiles.insert(
                *id,
                Arc::new(RecordingProfile {
                    id: *id,
                    log: Arc::clone(&log),
                    auto: options.auto,
                }),
            );
        }

        let config = ControllerConfig {
            profiles: options.profiles.clone(),
            airplane_mode_radios: options.airplane_mode_radios.clone(),
            airplane_toggleable_radios: options.airplane_toggleable_radios.clone(),
            ..Default::default()
        };

        let in_memory = Arc::new(InMemorySettings::new(options.radio_on));
        let settings: Arc<dyn SettingsStore> = match options.settings {
            Some(store) => store,
            None => in_memory.clone() as Arc<dyn SettingsStore>,
        };
        let airplane = AirplaneModeSwitch::new(options.airplane);
        let gateway = Arc::new(CountingGateway::default());

        let handle = spawn_controller(
            config,
            Collaborators {
                profiles,
                gateway: gateway.clone(),
                settings,
                ambient: Arc::new(airplane.clone()),
            },
        )
        .expect("controller should start");

        Self {
            control: handle.control(),
            events: handle.subscribe(),
            handle,
            airplane,
            log,
            settings: in_memory,
            gateway,
        }
    }

    pub fn report(&self, profile: ProfileId, state: ProfileState) -> bool {
        self.handle.reporter().report(profile, state)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().clone()
    }

    /// Receive events until `wanted`, returning everything seen on the way
    pub async fn wait_for(&mut self, wanted: LifecycleEvent) -> Vec<LifecycleEvent> {
        let events = &mut self.events;
        timeout(Duration::from_secs(30), async move {
            let mut seen = Vec::new();
            loop {
                let event = events.recv().await.expect("event stream closed");
                seen.push(event.clone());
                if event == wanted {
                    return seen;
                }
            }
        })
        .await
        .expect("timed out waiting for lifecycle event")
    }

    /// Wait until the log holds `n` calls
    pub async fn wait_for_calls(&self, n: usize) -> Vec<Call> {
        timeout(Duration::from_secs(30), async {
            loop {
                let calls = self.calls();
                if calls.len() >= n {
                    return calls;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for profile commands")
    }
}

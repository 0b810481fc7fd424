//! Controller task, the single owner of the adapter state machine
//!
//! Everything that can change the adapter lifecycle arrives as an
//! [`Event`] on one unbounded mailbox:
//! - control surface requests (enable / disable)
//! - profile reports, already folded into the tracker by [`ProfileReporter`]
//! - ambient condition changes from the airplane mode listener
//! - convergence deadlines
//!
//! The task feeds each event to [`AdapterStateMachine::handle`] and runs the
//! returned commands in order. Commands to profile services are
//! fire-and-forget, so a slow profile can never stall the mailbox.

use super::state_machine::{AdapterStateMachine, AmbientWatch, Command};
use super::{AdapterState, Event, LifecycleEvent};
use crate::ambient::AmbientCondition;
use crate::config::{ConfigError, ControllerConfig};
use crate::control::ControlSurface;
use crate::gateway::{AdapterProperties, NativeRadioGateway, PropertyId, PropertySink};
use crate::profile::{ProfileId, ProfileLifecycleTracker, ProfileReporter, ProfileServices};
use crate::settings::SettingsStore;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the lifecycle event broadcast; slow observers lag, never block
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("No service registered for profile {0}")]
    MissingProfileService(ProfileId),

    #[error("Native radio stack failed to initialize")]
    NativeInitFailed,

    #[error("Controller task failed: {0}")]
    TaskFailed(String),
}

/// External components the controller drives
pub struct Collaborators {
    pub profiles: ProfileServices,
    pub gateway: Arc<dyn NativeRadioGateway>,
    pub settings: Arc<dyn SettingsStore>,
    pub ambient: Arc<dyn AmbientCondition>,
}

/// Handle to a running controller task
pub struct ControllerHandle {
    control: ControlSurface,
    reporter: ProfileReporter,
    events: broadcast::Sender<LifecycleEvent>,
    task: JoinHandle<()>,
}

impl ControllerHandle {
    /// Control surface for callers; cheap to clone
    pub fn control(&self) -> ControlSurface {
        self.control.clone()
    }

    /// Reporting handle for profile services
    pub fn reporter(&self) -> ProfileReporter {
        self.reporter.clone()
    }

    /// Subscribe to lifecycle events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the controller to finalize
    pub async fn finished(self) -> Result<(), ControllerError> {
        self.task
            .await
            .map_err(|e| ControllerError::TaskFailed(e.to_string()))
    }
}

/// Initialize the native stack and spawn the controller task.
///
/// Must be called from within a tokio runtime.
pub fn spawn_controller(
    config: ControllerConfig,
    collaborators: Collaborators,
) -> Result<ControllerHandle, ControllerError> {
    config.validate()?;
    let registry = config.registry()?;

    if let Some(missing) = registry
        .start_order()
        .find(|id| !collaborators.profiles.contains(*id))
    {
        return Err(ControllerError::MissingProfileService(missing));
    }

    let Collaborators {
        profiles,
        gateway,
        settings,
        ambient,
    } = collaborators;

    let properties = Arc::new(AdapterProperties::new());
    if !gateway.initialize(PropertySink::new(Arc::clone(&properties))) {
        error!("Native radio stack failed to initialize");
        return Err(ControllerError::NativeInitFailed);
    }

    // load the name and address
    for id in [PropertyId::Address, PropertyId::Name] {
        if !gateway.request_property_read(id) {
            warn!("Native stack refused to read {:?}", id);
        }
    }

    let policy = config.airplane_policy();
    let tracker = Arc::new(ProfileLifecycleTracker::new(registry));
    let machine = AdapterStateMachine::new(
        Arc::clone(&tracker),
        policy,
        settings.radio_should_be_on(),
        ambient.current(),
    );

    let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(AdapterState::Off);
    let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

    let reporter = ProfileReporter::new(Arc::clone(&tracker), mailbox_tx.clone());
    let control = ControlSurface::new(
        mailbox_tx.clone(),
        state_rx,
        tracker,
        properties,
        Arc::clone(&gateway),
        Arc::clone(&ambient),
        policy,
    );

    let controller = AdapterController {
        machine,
        mailbox: mailbox_rx,
        mailbox_tx,
        reporter: reporter.clone(),
        profiles,
        gateway,
        settings,
        ambient,
        state_tx,
        events: events_tx.clone(),
        ambient_listener: None,
        convergence_timeout: config.convergence_timeout(),
    };

    info!(
        "Adapter controller started with profiles {:?}",
        config.profiles
    );
    let task = tokio::spawn(controller.run());

    Ok(ControllerHandle {
        control,
        reporter,
        events: events_tx,
        task,
    })
}

struct AdapterController {
    machine: AdapterStateMachine,
    mailbox: mpsc::UnboundedReceiver<Event>,
    mailbox_tx: mpsc::UnboundedSender<Event>,
    reporter: ProfileReporter,
    profiles: ProfileServices,
    gateway: Arc<dyn NativeRadioGateway>,
    settings: Arc<dyn SettingsStore>,
    ambient: Arc<dyn AmbientCondition>,
    state_tx: watch::Sender<AdapterState>,
    events: broadcast::Sender<LifecycleEvent>,
    ambient_listener: Option<JoinHandle<()>>,
    convergence_timeout: Option<Duration>,
}

impl AdapterController {
    async fn run(mut self) {
        while let Some(event) = self.mailbox.recv().await {
            debug!("Event: {:?}", event);

            for command in self.machine.handle(event) {
                self.execute(command);
            }

            if self.machine.is_finalized() {
                break;
            }
        }

        info!("Adapter controller exited");
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::StartProfile(profile) => match self.profiles.get(profile) {
                Some(service) => service.start(self.reporter.clone()),
                None => error!("No service registered for profile {}", profile),
            },
            Command::StopProfile(profile) => match self.profiles.get(profile) {
                Some(service) => service.stop(self.reporter.clone()),
                None => error!("No service registered for profile {}", profile),
            },
            Command::PersistRadioOn(on) => {
                if let Err(e) = self.settings.persist_radio_on(on) {
                    error!("Failed to persist radio setting: {}", e);
                }
            }
            Command::WatchAmbient(mode) => self.watch_ambient(mode),
            Command::UnwatchAmbient => self.unwatch_ambient(),
            Command::ArmDeadline { generation } => self.arm_deadline(generation),
            Command::Publish(event) => self.publish(event),
            Command::Finalize => self.finalize(),
        }
    }

    fn watch_ambient(&mut self, mode: AmbientWatch) {
        self.unwatch_ambient();
        debug!("Watching airplane mode ({:?})", mode);

        // the baseline is queued before any change the listener can see
        let mut rx = self.ambient.subscribe();
        let baseline = *rx.borrow_and_update();
        let _ = self.mailbox_tx.send(Event::AmbientBaseline(baseline));

        let mailbox = self.mailbox_tx.clone();
        self.ambient_listener = Some(tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let value = *rx.borrow_and_update();
                if mailbox.send(Event::AmbientChanged(value)).is_err() {
                    break;
                }
            }
        }));
    }

    fn unwatch_ambient(&mut self) {
        if let Some(listener) = self.ambient_listener.take() {
            debug!("Airplane mode listener removed");
            listener.abort();
        }
    }

    fn arm_deadline(&self, generation: u64) {
        let Some(timeout) = self.convergence_timeout else {
            return;
        };

        let mailbox = self.mailbox_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = mailbox.send(Event::DeadlineElapsed { generation });
        });
    }

    fn publish(&self, event: LifecycleEvent) {
        if let LifecycleEvent::StateChanged(state) = event {
            info!("Adapter state: {}", state);
            self.state_tx.send_replace(state);
        }

        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn finalize(&mut self) {
        self.unwatch_ambient();
        info!("Cleaning up adapter native resources...");
        self.gateway.teardown();
        self.publish(LifecycleEvent::Finalized);
    }
}

impl Drop for AdapterController {
    fn drop(&mut self) {
        self.unwatch_ambient();
    }
}

// radiod core: adapter lifecycle orchestration
//
// Brings a set of profile services up and down as one adapter and keeps
// it in step with airplane mode.

pub mod ambient;
pub mod config;
pub mod control;
pub mod gateway;
pub mod lifecycle;
pub mod profile;
pub mod settings;

pub use ambient::{AirplaneModeSwitch, AirplanePolicy, AmbientCondition};
pub use config::{ConfigError, ControllerConfig};
pub use control::{ControlError, ControlSurface, Credential};
pub use gateway::{
    AdapterProperties, BdAddr, BondState, ConnectionState, NativeRadioGateway, PropertyId,
    PropertySink, PropertyValue, ScanMode,
};
pub use lifecycle::{
    spawn_controller, AdapterState, Collaborators, ControllerError, ControllerHandle,
    LifecycleEvent,
};
pub use profile::{
    ProfileId, ProfileLifecycleTracker, ProfileRegistry, ProfileReporter, ProfileService,
    ProfileServices, ProfileState,
};
pub use settings::{InMemorySettings, JsonFileSettings, SettingsError, SettingsStore};

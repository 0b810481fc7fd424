//! Native radio gateway seam and the adapter property cache
//!
//! The gateway is the low-level driver interface. Every request returns
//! immediately with an accepted/refused flag; the result, if any, arrives
//! later through the [`PropertySink`] handed over at initialization.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Adapter property identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyId {
    Address,
    Name,
    ScanMode,
    DiscoverableTimeout,
}

/// Device address, six octets, most significant first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BdAddr(pub [u8; 6]);

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}", a, b, c, d, e, g)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid device address: {0}")]
pub struct InvalidAddress(pub String);

impl FromStr for BdAddr {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');

        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(|| InvalidAddress(s.to_string()))?;
            if part.len() != 2 {
                return Err(InvalidAddress(s.to_string()));
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| InvalidAddress(s.to_string()))?;
        }

        if parts.next().is_some() {
            return Err(InvalidAddress(s.to_string()));
        }
        Ok(BdAddr(octets))
    }
}

/// Inquiry/page scan mode of the adapter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMode {
    #[default]
    None,
    Connectable,
    ConnectableDiscoverable,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMode::None => write!(f, "None"),
            ScanMode::Connectable => write!(f, "Connectable"),
            ScanMode::ConnectableDiscoverable => write!(f, "ConnectableDiscoverable"),
        }
    }
}

/// Pairing state of a remote device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondState {
    #[default]
    None,
    Bonding,
    Bonded,
}

/// Aggregate connection state of the adapter across its profiles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// A property value as written to or reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    Address(BdAddr),
    Name(String),
    ScanMode(ScanMode),
    DiscoverableTimeout(u32),
}

impl PropertyValue {
    pub fn id(&self) -> PropertyId {
        match self {
            PropertyValue::Address(_) => PropertyId::Address,
            PropertyValue::Name(_) => PropertyId::Name,
            PropertyValue::ScanMode(_) => PropertyId::ScanMode,
            PropertyValue::DiscoverableTimeout(_) => PropertyId::DiscoverableTimeout,
        }
    }
}

/// Low-level radio control interface
pub trait NativeRadioGateway: Send + Sync {
    /// Bring up the native stack. Completions are delivered to `callbacks`.
    fn initialize(&self, callbacks: PropertySink) -> bool;

    /// Release native resources
    fn teardown(&self);

    /// Ask for a property; the value arrives via the property sink
    fn request_property_read(&self, id: PropertyId) -> bool;

    /// Ask to change a property; the new value arrives via the property sink
    fn request_property_write(&self, value: PropertyValue) -> bool;

    /// Begin device inquiry. Progress is reported with `discovery_changed`.
    fn start_discovery(&self) -> bool;

    fn cancel_discovery(&self) -> bool;

    /// Begin pairing with `addr`. Progress is reported with `bond_state_changed`.
    fn create_bond(&self, addr: BdAddr) -> bool;

    fn cancel_bond(&self, addr: BdAddr) -> bool;

    fn remove_bond(&self, addr: BdAddr) -> bool;
}

#[derive(Debug, Clone, Default)]
struct PropertyCache {
    address: Option<BdAddr>,
    name: Option<String>,
    scan_mode: ScanMode,
    discoverable_timeout: u32,
    discovering: bool,
    connection_state: ConnectionState,
    bonds: HashMap<BdAddr, BondState>,
}

/// Last values reported by the native stack
#[derive(Debug, Default)]
pub struct AdapterProperties {
    cache: RwLock<PropertyCache>,
}

impl AdapterProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(&self) -> Option<BdAddr> {
        self.cache.read().address
    }

    pub fn name(&self) -> Option<String> {
        self.cache.read().name.clone()
    }

    pub fn scan_mode(&self) -> ScanMode {
        self.cache.read().scan_mode
    }

    pub fn discoverable_timeout(&self) -> u32 {
        self.cache.read().discoverable_timeout
    }

    pub fn is_discovering(&self) -> bool {
        self.cache.read().discovering
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.cache.read().connection_state
    }

    /// Unknown devices are unbonded
    pub fn bond_state(&self, addr: BdAddr) -> BondState {
        self.cache
            .read()
            .bonds
            .get(&addr)
            .copied()
            .unwrap_or_default()
    }

    pub fn bonded_devices(&self) -> Vec<BdAddr> {
        let mut devices: Vec<BdAddr> = self
            .cache
            .read()
            .bonds
            .iter()
            .filter(|(_, state)| **state == BondState::Bonded)
            .map(|(addr, _)| *addr)
            .collect();
        devices.sort_by_key(|addr| addr.0);
        devices
    }

    fn apply(&self, value: PropertyValue) {
        let mut cache = self.cache.write();
        match value {
            PropertyValue::Address(addr) => cache.address = Some(addr),
            PropertyValue::Name(name) => cache.name = Some(name),
            PropertyValue::ScanMode(mode) => cache.scan_mode = mode,
            PropertyValue::DiscoverableTimeout(secs) => cache.discoverable_timeout = secs,
        }
    }
}

/// Callback target for property-changed notifications from the gateway
#[derive(Debug, Clone)]
pub struct PropertySink {
    properties: Arc<AdapterProperties>,
}

impl PropertySink {
    pub fn new(properties: Arc<AdapterProperties>) -> Self {
        Self { properties }
    }

    pub fn property_changed(&self, value: PropertyValue) {
        debug!("Adapter property changed: {:?}", value);
        self.properties.apply(value);
    }

    pub fn discovery_changed(&self, discovering: bool) {
        debug!("Discovery {}", if discovering { "started" } else { "stopped" });
        self.properties.cache.write().discovering = discovering;
    }

    pub fn bond_state_changed(&self, addr: BdAddr, state: BondState) {
        debug!("Bond state of {}: {:?}", addr, state);
        let mut cache = self.properties.cache.write();
        if state == BondState::None {
            cache.bonds.remove(&addr);
        } else {
            cache.bonds.insert(addr, state);
        }
    }

    pub fn connection_state_changed(&self, state: ConnectionState) {
        debug!("Adapter connection state: {:?}", state);
        self.properties.cache.write().connection_state = state;
    }
}

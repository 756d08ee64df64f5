//! Interface topology - bridge, physical and virtual classification
//!
//! Everything here is a pure read of host state. Descriptors are built
//! fresh for each recovery attempt; nothing is cached.

use crate::error::RecoveryError;
use crate::host::NetHost;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Name prefixes of interfaces that never map to a NIC of their own:
/// Proxmox firewall plumbing, VM taps, tunnels, loopback, bonds and teams.
pub const VIRTUAL_PREFIXES: &[&str] = &[
    "lo", "fwpr", "fwln", "fwbr", "tap", "veth", "vnet", "tun", "bond", "team", "docker",
    "virbr", "vmbr", "vxlan", "dummy", "wg",
];

/// Kernel drivers that back software-only interfaces
pub const VIRTUAL_DRIVERS: &[&str] = &[
    "veth",
    "tun",
    "bridge",
    "bonding",
    "team",
    "dummy",
    "vxlan",
    "openvswitch",
    "macvlan",
    "ipvlan",
];

/// Intel Ethernet drivers that accept the offload workaround
pub const INTEL_DRIVERS: &[&str] = &[
    "e1000", "e1000e", "igb", "igbvf", "igc", "ixgb", "ixgbe", "ixgbevf", "i40e", "ice",
];

/// Driver known to lock up with "Detected Hardware Unit Hang"
pub const HANG_PRONE_DRIVER: &str = "e1000e";

/// Driver family, the input of strategy selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverClass {
    /// Intel e1000e, prone to hardware unit hangs
    IntelE1000E,
    /// Any other Intel Ethernet driver
    IntelGeneric(String),
    /// Everything else; `None` when no driver could be resolved
    Other(Option<String>),
}

impl DriverClass {
    pub fn is_intel(&self) -> bool {
        matches!(self, DriverClass::IntelE1000E | DriverClass::IntelGeneric(_))
    }
}

/// Map a driver name to its class
pub fn classify_driver(driver: Option<&str>) -> DriverClass {
    match driver {
        Some(HANG_PRONE_DRIVER) => DriverClass::IntelE1000E,
        Some(name) if INTEL_DRIVERS.contains(&name) => DriverClass::IntelGeneric(name.to_string()),
        other => DriverClass::Other(other.map(str::to_string)),
    }
}

/// Whether a name follows a virtual interface naming convention
pub fn is_virtual_name(name: &str) -> bool {
    VIRTUAL_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

pub fn is_virtual_driver(driver: &str) -> bool {
    VIRTUAL_DRIVERS.contains(&driver)
}

/// One interface as seen during a single recovery attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    pub name: String,
    pub is_bridge: bool,
    pub driver: Option<String>,
    pub is_virtual: bool,
}

impl InterfaceDescriptor {
    pub fn driver_class(&self) -> DriverClass {
        classify_driver(self.driver.as_deref())
    }

    pub fn driver_label(&self) -> &str {
        self.driver.as_deref().unwrap_or("unknown")
    }
}

/// A bridge and its ports for the duration of one attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeTopology {
    pub bridge_name: String,
    /// OS enumeration order, kept so repair order is reproducible
    pub members: Vec<InterfaceDescriptor>,
}

impl BridgeTopology {
    pub fn physical_members(&self) -> impl Iterator<Item = &InterfaceDescriptor> {
        self.members.iter().filter(|m| !m.is_virtual)
    }

    pub fn virtual_members(&self) -> impl Iterator<Item = &InterfaceDescriptor> {
        self.members.iter().filter(|m| m.is_virtual)
    }
}

pub struct TopologyResolver<'a, H: NetHost + ?Sized> {
    host: &'a H,
}

impl<'a, H: NetHost + ?Sized> TopologyResolver<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self { host }
    }

    /// Describe an interface
    pub fn resolve(&self, name: &str) -> Result<InterfaceDescriptor, RecoveryError> {
        if !self.host.interface_exists(name) {
            return Err(RecoveryError::InterfaceNotFound(name.to_string()));
        }

        let is_bridge = self.host.is_bridge(name);
        let driver = self.driver_of(name);
        let is_virtual = is_bridge
            || is_virtual_name(name)
            || !self.host.has_device(name)
            || driver.as_deref().map(is_virtual_driver).unwrap_or(false);

        let descriptor = InterfaceDescriptor {
            name: name.to_string(),
            is_bridge,
            driver,
            is_virtual,
        };
        debug!(
            "{}: bridge={} virtual={} driver={}",
            descriptor.name,
            descriptor.is_bridge,
            descriptor.is_virtual,
            descriptor.driver_label()
        );
        Ok(descriptor)
    }

    /// Bridge ports in enumeration order; empty for non-bridges
    pub fn bridge_members(&self, bridge: &str) -> Vec<String> {
        if !self.host.is_bridge(bridge) {
            return Vec::new();
        }

        match self.host.bridge_members(bridge) {
            Ok(members) => members,
            Err(e) => {
                warn!("Cannot enumerate members of bridge {}: {}", bridge, e);
                Vec::new()
            }
        }
    }

    pub fn driver_of(&self, name: &str) -> Option<String> {
        self.host.driver_of(name)
    }

    /// Resolve a bridge and all readable members. Unreadable members are
    /// logged and left out.
    pub fn topology(&self, bridge: &str) -> BridgeTopology {
        let mut members = Vec::new();
        for member in self.bridge_members(bridge) {
            match self.resolve(&member) {
                Ok(descriptor) => members.push(descriptor),
                Err(e) => warn!("Skipping bridge member {}: {}", member, e),
            }
        }

        BridgeTopology {
            bridge_name: bridge.to_string(),
            members,
        }
    }

    /// Interface carrying the default route, else the first non-loopback one
    pub fn default_interface(&self) -> Result<String, RecoveryError> {
        if let Some(name) = self.host.default_route().and_then(|r| r.interface) {
            debug!("Default route goes through {}", name);
            return Ok(name);
        }

        let interfaces = self.host.list_interfaces()?;
        interfaces
            .into_iter()
            .find(|name| name != "lo")
            .ok_or(RecoveryError::NoInterface)
    }
}

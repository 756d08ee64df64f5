//! Host abstraction - every OS primitive the engine touches
//!
//! The engine never runs a command or reads sysfs directly. It goes through
//! `NetHost`, so a run can be dry-run (`DryRunHost`) or scripted in tests.

mod dry_run;
mod system;

pub use dry_run::DryRunHost;
pub use system::{parse_default_route, parse_link_names, SystemHost};

use crate::error::HostError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Administrative link state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Up,
    Down,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Up => "up",
            LinkState::Down => "down",
        }
    }
}

/// Default route as reported by the routing table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultRoute {
    /// Gateway IP address
    pub gateway: Option<String>,
    /// Interface used for the default route
    pub interface: Option<String>,
    /// Metric (lower = higher priority)
    pub metric: Option<u32>,
}

/// OS primitives consumed by the recovery engine.
///
/// Read methods must not change system state. Mutating methods return
/// `HostError` on OS-level failure; the engine decides whether that is fatal.
pub trait NetHost: Send + Sync {
    // Inventory

    /// Whether the interface exists at all
    fn interface_exists(&self, name: &str) -> bool;

    /// All interfaces in kernel index order
    fn list_interfaces(&self) -> Result<Vec<String>, HostError>;

    /// First default route, if any
    fn default_route(&self) -> Option<DefaultRoute>;

    /// Whether the OS reports bridge metadata for the interface
    fn is_bridge(&self, name: &str) -> bool;

    /// Bridge ports in OS enumeration order
    fn bridge_members(&self, bridge: &str) -> Result<Vec<String>, HostError>;

    /// Whether an underlying device entry exists (physical NIC)
    fn has_device(&self, name: &str) -> bool;

    /// Kernel driver bound to the device, if any
    fn driver_of(&self, name: &str) -> Option<String>;

    /// Whether the device exposes a PCI function reset attribute
    fn pci_reset_available(&self, name: &str) -> bool;

    /// Kernel ring buffer with human-readable timestamps
    fn kernel_log(&self) -> Result<String, HostError>;

    /// System journal restricted to the last `window_minutes`
    fn system_log(&self, window_minutes: u32) -> Result<String, HostError>;

    /// Effective UID is 0
    fn is_root(&self) -> bool;

    /// Single reachability probe with a timeout
    fn ping(&self, target: &str, timeout: Duration) -> bool;

    fn address_state(&self, name: &str) -> Result<String, HostError>;

    fn routing_table(&self) -> Result<String, HostError>;

    /// Resolve a hostname through the system resolver
    fn resolve_host(&self, host: &str) -> Result<String, HostError>;

    fn service_active(&self, unit: &str) -> bool;

    fn read_file(&self, path: &Path) -> Option<String>;

    // Mutations

    fn set_link(&self, name: &str, state: LinkState) -> Result<(), HostError>;

    /// Toggle one ethtool offload feature
    fn set_feature(&self, name: &str, feature: &str, enabled: bool) -> Result<(), HostError>;

    fn unload_module(&self, module: &str) -> Result<(), HostError>;

    fn load_module(&self, module: &str) -> Result<(), HostError>;

    /// Trigger a PCI function reset of the interface's device
    fn pci_reset(&self, name: &str) -> Result<(), HostError>;

    fn restart_service(&self, unit: &str) -> Result<(), HostError>;

    /// Release and re-acquire the DHCP lease
    fn renew_dhcp(&self, name: &str, timeout: Duration) -> Result<(), HostError>;

    fn write_file(&self, path: &Path, contents: &str) -> Result<(), HostError>;

    fn daemon_reload(&self) -> Result<(), HostError>;

    fn enable_unit(&self, unit: &str) -> Result<(), HostError>;

    /// Wait for a state change to settle
    fn settle(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

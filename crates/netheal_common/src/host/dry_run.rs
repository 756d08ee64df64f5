//! Dry-run host: real reads, logged mutations
//!
//! Wraps another host. Inventory, log and probe calls pass through so the
//! engine still makes real decisions; every state change is logged instead
//! of applied and settle waits are skipped.

use super::{DefaultRoute, LinkState, NetHost};
use crate::error::HostError;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub struct DryRunHost<H> {
    inner: H,
}

impl<H: NetHost> DryRunHost<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<H: NetHost> NetHost for DryRunHost<H> {
    fn interface_exists(&self, name: &str) -> bool {
        self.inner.interface_exists(name)
    }

    fn list_interfaces(&self) -> Result<Vec<String>, HostError> {
        self.inner.list_interfaces()
    }

    fn default_route(&self) -> Option<DefaultRoute> {
        self.inner.default_route()
    }

    fn is_bridge(&self, name: &str) -> bool {
        self.inner.is_bridge(name)
    }

    fn bridge_members(&self, bridge: &str) -> Result<Vec<String>, HostError> {
        self.inner.bridge_members(bridge)
    }

    fn has_device(&self, name: &str) -> bool {
        self.inner.has_device(name)
    }

    fn driver_of(&self, name: &str) -> Option<String> {
        self.inner.driver_of(name)
    }

    fn pci_reset_available(&self, name: &str) -> bool {
        self.inner.pci_reset_available(name)
    }

    fn kernel_log(&self) -> Result<String, HostError> {
        self.inner.kernel_log()
    }

    fn system_log(&self, window_minutes: u32) -> Result<String, HostError> {
        self.inner.system_log(window_minutes)
    }

    // A dry run never needs privileges
    fn is_root(&self) -> bool {
        true
    }

    fn ping(&self, target: &str, timeout: Duration) -> bool {
        self.inner.ping(target, timeout)
    }

    fn address_state(&self, name: &str) -> Result<String, HostError> {
        self.inner.address_state(name)
    }

    fn routing_table(&self) -> Result<String, HostError> {
        self.inner.routing_table()
    }

    fn resolve_host(&self, host: &str) -> Result<String, HostError> {
        self.inner.resolve_host(host)
    }

    fn service_active(&self, unit: &str) -> bool {
        self.inner.service_active(unit)
    }

    fn read_file(&self, path: &Path) -> Option<String> {
        self.inner.read_file(path)
    }

    fn set_link(&self, name: &str, state: LinkState) -> Result<(), HostError> {
        info!("[dry-run] ip link set dev {} {}", name, state.as_str());
        Ok(())
    }

    fn set_feature(&self, name: &str, feature: &str, enabled: bool) -> Result<(), HostError> {
        let value = if enabled { "on" } else { "off" };
        info!("[dry-run] ethtool -K {} {} {}", name, feature, value);
        Ok(())
    }

    fn unload_module(&self, module: &str) -> Result<(), HostError> {
        info!("[dry-run] modprobe -r {}", module);
        Ok(())
    }

    fn load_module(&self, module: &str) -> Result<(), HostError> {
        info!("[dry-run] modprobe {}", module);
        Ok(())
    }

    fn pci_reset(&self, name: &str) -> Result<(), HostError> {
        info!("[dry-run] echo 1 > /sys/class/net/{}/device/reset", name);
        Ok(())
    }

    fn restart_service(&self, unit: &str) -> Result<(), HostError> {
        info!("[dry-run] systemctl restart {}", unit);
        Ok(())
    }

    fn renew_dhcp(&self, name: &str, _timeout: Duration) -> Result<(), HostError> {
        info!("[dry-run] dhclient -r {} && dhclient {}", name, name);
        Ok(())
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<(), HostError> {
        info!(
            "[dry-run] write {} ({} bytes)",
            path.display(),
            contents.len()
        );
        Ok(())
    }

    fn daemon_reload(&self) -> Result<(), HostError> {
        info!("[dry-run] systemctl daemon-reload");
        Ok(())
    }

    fn enable_unit(&self, unit: &str) -> Result<(), HostError> {
        info!("[dry-run] systemctl enable {}", unit);
        Ok(())
    }

    fn settle(&self, duration: Duration) {
        debug!("[dry-run] skipping {:?} settle wait", duration);
    }
}

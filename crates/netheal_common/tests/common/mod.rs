//! Scripted host for engine tests
//!
//! Interfaces, logs and probe results are declared up front; every mutating
//! call is recorded so tests can assert on order and targets.

#![allow(dead_code)]

use netheal_common::config::RecoveryConfig;
use netheal_common::{DefaultRoute, HostError, LinkState, NetHost};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Link(String, LinkState),
    Feature(String, String, bool),
    Unload(String),
    Load(String),
    /// modprobe attempt that the host rejected
    LoadFailed(String),
    PciReset(String),
    Restart(String),
    Dhcp(String),
    Write(PathBuf),
    DaemonReload,
    Enable(String),
}

/// When a probe target answers
#[derive(Debug, Clone, Copy)]
pub enum Reach {
    Always,
    /// From the nth probe of this target on (1-based)
    FromPing(usize),
    /// Once any DHCP renewal has happened
    AfterDhcp,
}

#[derive(Debug, Clone, Default)]
struct FakeIface {
    name: String,
    bridge_members: Option<Vec<String>>,
    device: bool,
    driver: Option<String>,
    pci_reset: bool,
}

#[derive(Default)]
pub struct FakeHost {
    root: bool,
    ifaces: Vec<FakeIface>,
    route: Option<DefaultRoute>,
    kernel_log: Option<String>,
    journal: Option<String>,
    reach: HashMap<String, Reach>,
    busy_modules: Vec<String>,
    failing_features: Vec<String>,
    failing_links: Vec<String>,
    active_services: Vec<String>,
    load_failures: Mutex<usize>,
    reload_failures: Mutex<usize>,
    pub files: Mutex<HashMap<PathBuf, String>>,
    calls: Mutex<Vec<Call>>,
    pings: Mutex<Vec<String>>,
    settles: Mutex<Vec<Duration>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            root: true,
            kernel_log: Some(String::new()),
            journal: Some(String::new()),
            active_services: vec!["networking".to_string()],
            ..Default::default()
        }
    }

    pub fn physical(mut self, name: &str, driver: Option<&str>) -> Self {
        self.ifaces.push(FakeIface {
            name: name.to_string(),
            device: true,
            driver: driver.map(str::to_string),
            ..Default::default()
        });
        self
    }

    pub fn virtual_iface(mut self, name: &str, driver: Option<&str>) -> Self {
        self.ifaces.push(FakeIface {
            name: name.to_string(),
            device: false,
            driver: driver.map(str::to_string),
            ..Default::default()
        });
        self
    }

    pub fn bridge(mut self, name: &str, members: &[&str]) -> Self {
        self.ifaces.push(FakeIface {
            name: name.to_string(),
            bridge_members: Some(members.iter().map(|m| m.to_string()).collect()),
            driver: Some("bridge".to_string()),
            ..Default::default()
        });
        self
    }

    pub fn pci_reset(mut self, name: &str) -> Self {
        if let Some(iface) = self.ifaces.iter_mut().find(|i| i.name == name) {
            iface.pci_reset = true;
        }
        self
    }

    pub fn not_root(mut self) -> Self {
        self.root = false;
        self
    }

    pub fn default_route(mut self, interface: &str, gateway: &str) -> Self {
        self.route = Some(DefaultRoute {
            gateway: Some(gateway.to_string()),
            interface: Some(interface.to_string()),
            metric: None,
        });
        self
    }

    pub fn kernel_log(mut self, text: Option<&str>) -> Self {
        self.kernel_log = text.map(str::to_string);
        self
    }

    pub fn journal(mut self, text: Option<&str>) -> Self {
        self.journal = text.map(str::to_string);
        self
    }

    pub fn reach(mut self, target: &str, reach: Reach) -> Self {
        self.reach.insert(target.to_string(), reach);
        self
    }

    pub fn busy_module(mut self, module: &str) -> Self {
        self.busy_modules.push(module.to_string());
        self
    }

    pub fn failing_feature(mut self, feature: &str) -> Self {
        self.failing_features.push(feature.to_string());
        self
    }

    pub fn failing_link(mut self, name: &str) -> Self {
        self.failing_links.push(name.to_string());
        self
    }

    /// The next `times` module loads fail
    pub fn failing_load(self, times: usize) -> Self {
        *self.load_failures.lock().unwrap() = times;
        self
    }

    /// The next `times` daemon-reloads fail
    pub fn failing_daemon_reload(self, times: usize) -> Self {
        *self.reload_failures.lock().unwrap() = times;
        self
    }

    pub fn active_services(mut self, units: &[&str]) -> Self {
        self.active_services = units.iter().map(|u| u.to_string()).collect();
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn pings(&self) -> Vec<String> {
        self.pings.lock().unwrap().clone()
    }

    pub fn settles(&self) -> Vec<Duration> {
        self.settles.lock().unwrap().clone()
    }

    /// Interfaces that received any mutating call
    pub fn touched(&self) -> Vec<String> {
        let mut names = Vec::new();
        for call in self.calls() {
            let name = match call {
                Call::Link(n, _) | Call::Feature(n, _, _) | Call::PciReset(n) => n,
                _ => continue,
            };
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    fn iface(&self, name: &str) -> Option<&FakeIface> {
        self.ifaces.iter().find(|i| i.name == name)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn dhcp_done(&self) -> bool {
        self.calls().iter().any(|c| matches!(c, Call::Dhcp(_)))
    }
}

fn failed(command: &str) -> HostError {
    HostError::CommandFailed {
        command: command.to_string(),
        status: 1,
        stderr: "simulated failure".to_string(),
    }
}

/// Consume one scripted failure, if any are left
fn take_failure(budget: &Mutex<usize>) -> bool {
    let mut left = budget.lock().unwrap();
    if *left == 0 {
        return false;
    }
    *left -= 1;
    true
}

impl NetHost for FakeHost {
    fn interface_exists(&self, name: &str) -> bool {
        self.iface(name).is_some()
    }

    fn list_interfaces(&self) -> Result<Vec<String>, HostError> {
        Ok(self.ifaces.iter().map(|i| i.name.clone()).collect())
    }

    fn default_route(&self) -> Option<DefaultRoute> {
        self.route.clone()
    }

    fn is_bridge(&self, name: &str) -> bool {
        self.iface(name)
            .map(|i| i.bridge_members.is_some())
            .unwrap_or(false)
    }

    fn bridge_members(&self, bridge: &str) -> Result<Vec<String>, HostError> {
        Ok(self
            .iface(bridge)
            .and_then(|i| i.bridge_members.clone())
            .unwrap_or_default())
    }

    fn has_device(&self, name: &str) -> bool {
        self.iface(name).map(|i| i.device).unwrap_or(false)
    }

    fn driver_of(&self, name: &str) -> Option<String> {
        self.iface(name).and_then(|i| i.driver.clone())
    }

    fn pci_reset_available(&self, name: &str) -> bool {
        self.iface(name).map(|i| i.pci_reset).unwrap_or(false)
    }

    fn kernel_log(&self) -> Result<String, HostError> {
        self.kernel_log.clone().ok_or_else(|| HostError::Unavailable {
            what: "dmesg".to_string(),
            reason: "permission denied".to_string(),
        })
    }

    fn system_log(&self, _window_minutes: u32) -> Result<String, HostError> {
        self.journal.clone().ok_or_else(|| HostError::Unavailable {
            what: "journalctl".to_string(),
            reason: "no journal".to_string(),
        })
    }

    fn is_root(&self) -> bool {
        self.root
    }

    fn ping(&self, target: &str, _timeout: Duration) -> bool {
        let count = {
            let mut pings = self.pings.lock().unwrap();
            pings.push(target.to_string());
            pings.iter().filter(|t| *t == target).count()
        };
        match self.reach.get(target) {
            Some(Reach::Always) => true,
            Some(Reach::FromPing(n)) => count >= *n,
            Some(Reach::AfterDhcp) => self.dhcp_done(),
            None => false,
        }
    }

    fn address_state(&self, name: &str) -> Result<String, HostError> {
        Ok(format!("2: {}: <BROADCAST,MULTICAST,UP> mtu 1500", name))
    }

    fn routing_table(&self) -> Result<String, HostError> {
        Ok("default via 192.168.1.1 dev vmbr0".to_string())
    }

    fn resolve_host(&self, host: &str) -> Result<String, HostError> {
        Err(failed(&format!("getent hosts {}", host)))
    }

    fn service_active(&self, unit: &str) -> bool {
        self.active_services.iter().any(|u| u == unit)
    }

    fn read_file(&self, path: &Path) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    fn set_link(&self, name: &str, state: LinkState) -> Result<(), HostError> {
        if self.failing_links.iter().any(|n| n == name) {
            return Err(failed(&format!("ip link set dev {} {}", name, state.as_str())));
        }
        self.record(Call::Link(name.to_string(), state));
        Ok(())
    }

    fn set_feature(&self, name: &str, feature: &str, enabled: bool) -> Result<(), HostError> {
        if self.failing_features.iter().any(|f| f == feature) {
            return Err(failed(&format!("ethtool -K {} {}", name, feature)));
        }
        self.record(Call::Feature(name.to_string(), feature.to_string(), enabled));
        Ok(())
    }

    fn unload_module(&self, module: &str) -> Result<(), HostError> {
        if self.busy_modules.iter().any(|m| m == module) {
            return Err(HostError::CommandFailed {
                command: format!("modprobe -r {}", module),
                status: 1,
                stderr: format!("modprobe: FATAL: Module {} is in use.", module),
            });
        }
        self.record(Call::Unload(module.to_string()));
        Ok(())
    }

    fn load_module(&self, module: &str) -> Result<(), HostError> {
        if take_failure(&self.load_failures) {
            self.record(Call::LoadFailed(module.to_string()));
            return Err(failed(&format!("modprobe {}", module)));
        }
        self.record(Call::Load(module.to_string()));
        Ok(())
    }

    fn pci_reset(&self, name: &str) -> Result<(), HostError> {
        if !self.pci_reset_available(name) {
            return Err(HostError::Unavailable {
                what: format!("PCI reset for {}", name),
                reason: "no reset attribute".to_string(),
            });
        }
        self.record(Call::PciReset(name.to_string()));
        Ok(())
    }

    fn restart_service(&self, unit: &str) -> Result<(), HostError> {
        self.record(Call::Restart(unit.to_string()));
        Ok(())
    }

    fn renew_dhcp(&self, name: &str, _timeout: Duration) -> Result<(), HostError> {
        self.record(Call::Dhcp(name.to_string()));
        Ok(())
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<(), HostError> {
        self.record(Call::Write(path.to_path_buf()));
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn daemon_reload(&self) -> Result<(), HostError> {
        if take_failure(&self.reload_failures) {
            return Err(failed("systemctl daemon-reload"));
        }
        self.record(Call::DaemonReload);
        Ok(())
    }

    fn enable_unit(&self, unit: &str) -> Result<(), HostError> {
        self.record(Call::Enable(unit.to_string()));
        Ok(())
    }

    fn settle(&self, duration: Duration) {
        self.settles.lock().unwrap().push(duration);
    }
}

/// Kernel log line matching the e1000e hang signature for `iface`
pub fn hang_line(iface: &str) -> String {
    format!(
        "[ 5123.001] e1000e 0000:00:1f.6 {}: Detected Hardware Unit Hang:\n",
        iface
    )
}

/// Defaults with small, distinct delays so settle calls are identifiable
pub fn test_config() -> RecoveryConfig {
    let mut config = RecoveryConfig::default();
    config.verify.attempts = 4;
    config.verify.bridge_attempts = 6;
    config.verify.alternative_after = 3;
    config.workaround.unit_dir = PathBuf::from("/etc/systemd/system");
    config
}

//! Real host: sysfs reads and system commands
//!
//! Sources:
//! - /sys/class/net/<iface>/{bridge,brif,device,device/driver,device/reset}
//! - ip link, ip addr, ip route
//! - ethtool -K, modprobe, dhclient
//! - dmesg -T, journalctl
//! - systemctl

use super::{DefaultRoute, LinkState, NetHost};
use crate::error::HostError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::debug;

/// Default sysfs network class directory
pub const SYSFS_NET: &str = "/sys/class/net";

/// Exit status used by shells and `timeout` when the program is missing
const EXIT_NOT_FOUND: i32 = 127;

/// Host backed by the running system
#[derive(Debug, Clone)]
pub struct SystemHost {
    sysfs_net: PathBuf,
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemHost {
    pub fn new() -> Self {
        Self::with_sysfs_root(SYSFS_NET)
    }

    /// Use an alternative sysfs net directory (tests, containers)
    pub fn with_sysfs_root(root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_net: root.into(),
        }
    }

    fn iface_path(&self, name: &str) -> PathBuf {
        self.sysfs_net.join(name)
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<String, HostError> {
        let command = if args.is_empty() {
            program.to_string()
        } else {
            format!("{} {}", program, args.join(" "))
        };
        debug!("exec: {}", command);

        let output = Command::new(program).args(args).output().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                HostError::CommandMissing(program.to_string())
            } else {
                HostError::Io(e)
            }
        })?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let status = output.status.code().unwrap_or(-1);
        if status == EXIT_NOT_FOUND {
            return Err(HostError::CommandMissing(command));
        }

        Err(HostError::CommandFailed {
            command,
            status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

impl NetHost for SystemHost {
    fn interface_exists(&self, name: &str) -> bool {
        !name.is_empty() && self.iface_path(name).exists()
    }

    fn list_interfaces(&self) -> Result<Vec<String>, HostError> {
        let stdout = self.run("ip", &["-o", "link", "show"])?;
        Ok(parse_link_names(&stdout))
    }

    fn default_route(&self) -> Option<DefaultRoute> {
        let stdout = self.run("ip", &["route", "show", "default"]).ok()?;
        parse_default_route(&stdout)
    }

    fn is_bridge(&self, name: &str) -> bool {
        self.iface_path(name).join("bridge").is_dir()
    }

    fn bridge_members(&self, bridge: &str) -> Result<Vec<String>, HostError> {
        let brif = self.iface_path(bridge).join("brif");
        if !brif.is_dir() {
            return Ok(Vec::new());
        }

        let mut members = Vec::new();
        for entry in fs::read_dir(&brif)? {
            let entry = entry?;
            members.push(entry.file_name().to_string_lossy().to_string());
        }
        Ok(members)
    }

    fn has_device(&self, name: &str) -> bool {
        self.iface_path(name).join("device").exists()
    }

    fn driver_of(&self, name: &str) -> Option<String> {
        let link = fs::read_link(self.iface_path(name).join("device/driver")).ok()?;
        link.file_name().map(|n| n.to_string_lossy().to_string())
    }

    fn pci_reset_available(&self, name: &str) -> bool {
        self.iface_path(name).join("device/reset").exists()
    }

    fn kernel_log(&self) -> Result<String, HostError> {
        self.run("dmesg", &["-T"])
    }

    fn system_log(&self, window_minutes: u32) -> Result<String, HostError> {
        let since = format!("{} min ago", window_minutes);
        self.run("journalctl", &["-k", "--no-pager", "-q", "--since", &since])
    }

    fn is_root(&self) -> bool {
        unsafe { libc::geteuid() == 0 }
    }

    fn ping(&self, target: &str, timeout: Duration) -> bool {
        let wait = timeout.as_secs().max(1).to_string();
        self.run("ping", &["-c", "1", "-W", &wait, target]).is_ok()
    }

    fn address_state(&self, name: &str) -> Result<String, HostError> {
        self.run("ip", &["addr", "show", "dev", name])
    }

    fn routing_table(&self) -> Result<String, HostError> {
        self.run("ip", &["route", "show"])
    }

    fn resolve_host(&self, host: &str) -> Result<String, HostError> {
        self.run("getent", &["hosts", host])
    }

    fn service_active(&self, unit: &str) -> bool {
        self.run("systemctl", &["is-active", "--quiet", unit]).is_ok()
    }

    fn read_file(&self, path: &Path) -> Option<String> {
        fs::read_to_string(path).ok()
    }

    fn set_link(&self, name: &str, state: LinkState) -> Result<(), HostError> {
        self.run("ip", &["link", "set", "dev", name, state.as_str()])
            .map(|_| ())
    }

    fn set_feature(&self, name: &str, feature: &str, enabled: bool) -> Result<(), HostError> {
        let value = if enabled { "on" } else { "off" };
        self.run("ethtool", &["-K", name, feature, value]).map(|_| ())
    }

    fn unload_module(&self, module: &str) -> Result<(), HostError> {
        self.run("modprobe", &["-r", module]).map(|_| ())
    }

    fn load_module(&self, module: &str) -> Result<(), HostError> {
        self.run("modprobe", &[module]).map(|_| ())
    }

    fn pci_reset(&self, name: &str) -> Result<(), HostError> {
        let reset = self.iface_path(name).join("device/reset");
        if !reset.exists() {
            return Err(HostError::Unavailable {
                what: format!("PCI reset for {}", name),
                reason: format!("{} does not exist", reset.display()),
            });
        }
        fs::write(&reset, "1")?;
        Ok(())
    }

    fn restart_service(&self, unit: &str) -> Result<(), HostError> {
        self.run("systemctl", &["restart", unit]).map(|_| ())
    }

    fn renew_dhcp(&self, name: &str, timeout: Duration) -> Result<(), HostError> {
        let secs = timeout.as_secs().max(1).to_string();

        // Releasing may fail when no lease is held; acquiring is what matters.
        if let Err(e) = self.run("timeout", &[&secs, "dhclient", "-r", name]) {
            debug!("dhclient release on {} failed: {}", name, e);
        }

        match self.run("timeout", &[&secs, "dhclient", name]) {
            Ok(_) => Ok(()),
            Err(HostError::CommandMissing(_)) => {
                debug!("dhclient not installed, asking systemd-networkd to renew {}", name);
                self.run("networkctl", &["renew", name]).map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<(), HostError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    fn daemon_reload(&self) -> Result<(), HostError> {
        self.run("systemctl", &["daemon-reload"]).map(|_| ())
    }

    fn enable_unit(&self, unit: &str) -> Result<(), HostError> {
        self.run("systemctl", &["enable", unit]).map(|_| ())
    }
}

/// Parse interface names from `ip -o link show`
///
/// Lines look like `2: eno1: <BROADCAST,...> mtu 1500 ...` or
/// `7: veth1a2b@if6: <...>` for paired devices.
pub fn parse_link_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| {
            let name = line.split_whitespace().nth(1)?.trim_end_matches(':');
            let name = name.split('@').next().unwrap_or(name);
            if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            }
        })
        .collect()
}

/// Parse the first route of `ip route show default`
///
/// `default via 192.168.1.1 dev vmbr0 proto dhcp metric 600`
pub fn parse_default_route(stdout: &str) -> Option<DefaultRoute> {
    let line = stdout.lines().find(|l| l.starts_with("default"))?;
    let parts: Vec<&str> = line.split_whitespace().collect();
    let mut route = DefaultRoute::default();

    for pair in parts.windows(2) {
        match pair[0] {
            "via" => route.gateway = Some(pair[1].to_string()),
            "dev" => route.interface = Some(pair[1].to_string()),
            "metric" => route.metric = pair[1].parse().ok(),
            _ => {}
        }
    }

    Some(route)
}

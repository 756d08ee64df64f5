//! Persistent offload workaround
//!
//! A oneshot systemd unit, one per interface, that waits a fixed delay at
//! boot and disables the same offload features the engine disabled at
//! runtime. Rendering is deterministic, so writing the same record twice
//! leaves the file untouched. Removing the unit is an uninstall concern.

use crate::config::WorkaroundConfig;
use crate::error::HostError;
use crate::host::NetHost;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

pub const UNIT_PREFIX: &str = "ethtool-workaround-";

/// Service name for an interface: `ethtool-workaround-<iface>`
pub fn service_name(interface: &str) -> String {
    format!("{}{}", UNIT_PREFIX, interface)
}

/// Unit file name: `ethtool-workaround-<iface>.service`
pub fn unit_file_name(interface: &str) -> String {
    format!("{}.service", service_name(interface))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentWorkaroundRecord {
    pub interface: String,
    pub features: Vec<String>,
    pub boot_delay_secs: u64,
    pub ethtool_path: String,
}

impl PersistentWorkaroundRecord {
    pub fn new(interface: &str, features: &[String], config: &WorkaroundConfig) -> Self {
        Self {
            interface: interface.to_string(),
            features: features.to_vec(),
            boot_delay_secs: config.boot_delay_secs,
            ethtool_path: config.ethtool_path.clone(),
        }
    }

    pub fn unit_file_name(&self) -> String {
        unit_file_name(&self.interface)
    }

    /// Render the unit file. Each feature gets its own `ExecStart=-` line so
    /// one unsupported feature does not stop the rest.
    pub fn render(&self) -> String {
        let mut unit = String::new();
        unit.push_str("[Unit]\n");
        unit.push_str(&format!(
            "Description=Disable offload features on {} (hardware hang workaround)\n",
            self.interface
        ));
        unit.push_str("After=network-online.target\n");
        unit.push_str("Wants=network-online.target\n");
        unit.push('\n');
        unit.push_str("[Service]\n");
        unit.push_str("Type=oneshot\n");
        unit.push_str(&format!("ExecStartPre=/bin/sleep {}\n", self.boot_delay_secs));
        for feature in &self.features {
            unit.push_str(&format!(
                "ExecStart=-{} -K {} {} off\n",
                self.ethtool_path, self.interface, feature
            ));
        }
        unit.push_str("RemainAfterExit=yes\n");
        unit.push('\n');
        unit.push_str("[Install]\n");
        unit.push_str("WantedBy=multi-user.target\n");
        unit
    }
}

/// What happened to the unit file on install
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitWrite {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkaroundInstall {
    pub unit: String,
    pub path: PathBuf,
    pub write: UnitWrite,
}

pub struct WorkaroundWriter<'a, H: NetHost + ?Sized> {
    host: &'a H,
    config: &'a WorkaroundConfig,
}

impl<'a, H: NetHost + ?Sized> WorkaroundWriter<'a, H> {
    pub fn new(host: &'a H, config: &'a WorkaroundConfig) -> Self {
        Self { host, config }
    }

    pub fn unit_path(&self, interface: &str) -> PathBuf {
        self.config.unit_dir.join(unit_file_name(interface))
    }

    /// Write (if changed), reload systemd and enable the unit
    pub fn install(
        &self,
        record: &PersistentWorkaroundRecord,
    ) -> Result<WorkaroundInstall, HostError> {
        let path = self.unit_path(&record.interface);
        let rendered = record.render();

        let write = match self.host.read_file(&path) {
            Some(existing) if existing == rendered => UnitWrite::Unchanged,
            Some(_) => UnitWrite::Updated,
            None => UnitWrite::Created,
        };

        if write == UnitWrite::Unchanged {
            debug!("{} already up to date", path.display());
        } else {
            self.host.write_file(&path, &rendered)?;
            info!("Wrote boot-time workaround {}", path.display());
        }

        // An earlier write may have landed without its reload
        self.host.daemon_reload()?;
        let unit = record.unit_file_name();
        self.host.enable_unit(&unit)?;

        Ok(WorkaroundInstall { unit, path, write })
    }
}

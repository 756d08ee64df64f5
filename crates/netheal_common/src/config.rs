//! Configuration management for netheal.
//!
//! Loads settings from /etc/netheal/config.toml or uses defaults.
//! Every timing constant lives here so tests can inject near-zero delays.

use crate::error::ConfigError;
use crate::strategy::StrategyPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/netheal/config.toml";

/// Environment override for the config path
pub const CONFIG_ENV: &str = "NETHEAL_CONFIG";

/// Default log file
pub const DEFAULT_LOG_PATH: &str = "/var/log/netheal.log";

/// Settle intervals after state-changing operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleConfig {
    /// Wait between link down and link up
    #[serde(default = "default_link_settle")]
    pub link_secs: u64,

    /// Bridges need longer to re-learn their ports
    #[serde(default = "default_bridge_settle")]
    pub bridge_link_secs: u64,

    /// Wait after module unload and again after reload
    #[serde(default = "default_module_settle")]
    pub module_secs: u64,

    /// Wait after a PCI function reset
    #[serde(default = "default_pci_settle")]
    pub pci_secs: u64,

    /// Wait after restarting the network service
    #[serde(default = "default_service_settle")]
    pub service_secs: u64,
}

fn default_link_settle() -> u64 {
    3
}

fn default_bridge_settle() -> u64 {
    5
}

fn default_module_settle() -> u64 {
    3
}

fn default_pci_settle() -> u64 {
    5
}

fn default_service_settle() -> u64 {
    5
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            link_secs: default_link_settle(),
            bridge_link_secs: default_bridge_settle(),
            module_secs: default_module_settle(),
            pci_secs: default_pci_settle(),
            service_secs: default_service_settle(),
        }
    }
}

impl SettleConfig {
    pub fn link(&self, is_bridge: bool) -> Duration {
        if is_bridge {
            Duration::from_secs(self.bridge_link_secs)
        } else {
            Duration::from_secs(self.link_secs)
        }
    }

    pub fn module(&self) -> Duration {
        Duration::from_secs(self.module_secs)
    }

    pub fn pci(&self) -> Duration {
        Duration::from_secs(self.pci_secs)
    }

    pub fn service(&self) -> Duration {
        Duration::from_secs(self.service_secs)
    }
}

/// Connectivity verification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Target probed on every attempt
    #[serde(default = "default_primary_target")]
    pub primary_target: String,

    /// Targets tried once the primary keeps failing
    #[serde(default = "default_alternative_targets")]
    pub alternative_targets: Vec<String>,

    /// Host used for the DNS resolution test in the diagnostics dump
    #[serde(default = "default_dns_test_host")]
    pub dns_test_host: String,

    /// Per-probe timeout in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Attempts for a plain interface
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Attempts for a bridge
    #[serde(default = "default_bridge_attempts")]
    pub bridge_attempts: u32,

    /// Delay between attempts for a plain interface
    #[serde(default = "default_attempt_delay")]
    pub delay_secs: u64,

    /// Delay between attempts for a bridge
    #[serde(default = "default_bridge_attempt_delay")]
    pub bridge_delay_secs: u64,

    /// Attempt number from which gateway and alternative targets are probed
    #[serde(default = "default_alternative_after")]
    pub alternative_after: u32,
}

fn default_primary_target() -> String {
    "8.8.8.8".to_string()
}

fn default_alternative_targets() -> Vec<String> {
    vec!["1.1.1.1".to_string(), "9.9.9.9".to_string()]
}

fn default_dns_test_host() -> String {
    "debian.org".to_string()
}

fn default_probe_timeout() -> u64 {
    2
}

fn default_attempts() -> u32 {
    5
}

fn default_bridge_attempts() -> u32 {
    10
}

fn default_attempt_delay() -> u64 {
    3
}

fn default_bridge_attempt_delay() -> u64 {
    5
}

fn default_alternative_after() -> u32 {
    3
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            primary_target: default_primary_target(),
            alternative_targets: default_alternative_targets(),
            dns_test_host: default_dns_test_host(),
            probe_timeout_secs: default_probe_timeout(),
            attempts: default_attempts(),
            bridge_attempts: default_bridge_attempts(),
            delay_secs: default_attempt_delay(),
            bridge_delay_secs: default_bridge_attempt_delay(),
            alternative_after: default_alternative_after(),
        }
    }
}

impl VerifyConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn attempts_for(&self, is_bridge: bool) -> u32 {
        if is_bridge {
            self.bridge_attempts
        } else {
            self.attempts
        }
    }

    pub fn delay_for(&self, is_bridge: bool) -> Duration {
        if is_bridge {
            Duration::from_secs(self.bridge_delay_secs)
        } else {
            Duration::from_secs(self.delay_secs)
        }
    }
}

/// Hang detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HangConfig {
    /// Kernel message emitted by the driver when the controller locks up
    #[serde(default = "default_hang_signature")]
    pub signature: String,

    /// How far back to look, in minutes
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,

    /// Only the last N kernel ring buffer lines are scanned
    #[serde(default = "default_kernel_tail")]
    pub kernel_log_tail_lines: usize,
}

fn default_hang_signature() -> String {
    "Detected Hardware Unit Hang".to_string()
}

fn default_window_minutes() -> u32 {
    5
}

fn default_kernel_tail() -> usize {
    500
}

impl Default for HangConfig {
    fn default() -> Self {
        Self {
            signature: default_hang_signature(),
            window_minutes: default_window_minutes(),
            kernel_log_tail_lines: default_kernel_tail(),
        }
    }
}

/// Boot-time workaround unit settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkaroundConfig {
    /// Directory the service manager loads units from
    #[serde(default = "default_unit_dir")]
    pub unit_dir: PathBuf,

    /// Delay before re-applying features at boot
    #[serde(default = "default_boot_delay")]
    pub boot_delay_secs: u64,

    /// Absolute path of ethtool used in the unit
    #[serde(default = "default_ethtool_path")]
    pub ethtool_path: String,
}

fn default_unit_dir() -> PathBuf {
    PathBuf::from("/etc/systemd/system")
}

fn default_boot_delay() -> u64 {
    30
}

fn default_ethtool_path() -> String {
    "/usr/sbin/ethtool".to_string()
}

impl Default for WorkaroundConfig {
    fn default() -> Self {
        Self {
            unit_dir: default_unit_dir(),
            boot_delay_secs: default_boot_delay(),
            ethtool_path: default_ethtool_path(),
        }
    }
}

/// Top-level engine configuration. Immutable once the engine is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Full recovery sequences before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between full sequences
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Network services to restart, first active one wins
    #[serde(default = "default_network_services")]
    pub network_services: Vec<String>,

    /// Timeout for each DHCP client invocation
    #[serde(default = "default_dhcp_timeout")]
    pub dhcp_timeout_secs: u64,

    /// Log file mirrored from the console
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    #[serde(default)]
    pub settle: SettleConfig,

    #[serde(default)]
    pub verify: VerifyConfig,

    #[serde(default)]
    pub hang: HangConfig,

    #[serde(default)]
    pub policy: StrategyPolicy,

    #[serde(default)]
    pub workaround: WorkaroundConfig,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    10
}

fn default_network_services() -> Vec<String> {
    vec![
        "networking".to_string(),
        "NetworkManager".to_string(),
        "systemd-networkd".to_string(),
    ]
}

fn default_dhcp_timeout() -> u64 {
    30
}

fn default_log_path() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_PATH)
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
            network_services: default_network_services(),
            dhcp_timeout_secs: default_dhcp_timeout(),
            log_path: default_log_path(),
            settle: SettleConfig::default(),
            verify: VerifyConfig::default(),
            hang: HangConfig::default(),
            policy: StrategyPolicy::default(),
            workaround: WorkaroundConfig::default(),
        }
    }
}

impl RecoveryConfig {
    /// Load config: explicit path, then $NETHEAL_CONFIG, then /etc/netheal/config.toml.
    ///
    /// An explicit path that fails to load is an error. A missing system
    /// config falls back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load_from_path(Path::new(&path));
        }

        match Self::load_from_path(Path::new(CONFIG_PATH)) {
            Ok(config) => Ok(config),
            Err(ConfigError::Read { .. }) => {
                info!("No config at {}, using defaults", CONFIG_PATH);
                Ok(Self::default())
            }
            Err(e) => {
                warn!("{}, using defaults", e);
                Ok(Self::default())
            }
        }
    }

    /// Load config from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn dhcp_timeout(&self) -> Duration {
        Duration::from_secs(self.dhcp_timeout_secs)
    }
}

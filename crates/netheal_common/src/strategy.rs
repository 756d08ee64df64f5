//! Reset strategy selection
//!
//! Selection is a pure function of (driver class, hang state, PCI reset
//! availability) under a fixed policy: the same inputs always give the
//! same strategy.

use crate::topology::{DriverClass, InterfaceDescriptor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Repair procedures the executor knows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetStrategy {
    /// Link down, settle, link up
    SoftToggle,
    /// Disable offload features at runtime only
    FeatureCycle,
    /// Unload and reload the driver module
    ModuleReload,
    /// PCI function reset through sysfs
    PciReset,
    /// Disable offload features and persist that across reboots
    FeatureDisable,
}

impl ResetStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetStrategy::SoftToggle => "soft-toggle",
            ResetStrategy::FeatureCycle => "feature-cycle",
            ResetStrategy::ModuleReload => "module-reload",
            ResetStrategy::PciReset => "pci-reset",
            ResetStrategy::FeatureDisable => "feature-disable",
        }
    }
}

impl fmt::Display for ResetStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy knobs that shape selection and feature handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyPolicy {
    /// Reload e1000e even without hang evidence
    #[serde(default)]
    pub proactive_module_reload: bool,

    /// Write the boot-time unit when features are disabled
    #[serde(default = "default_persist")]
    pub persist_workaround: bool,

    /// Offload features turned off by FeatureCycle/FeatureDisable
    #[serde(default = "default_offload_features")]
    pub offload_features: Vec<String>,

    /// `modprobe <driver>` tries after a successful unload
    #[serde(default = "default_module_load_attempts")]
    pub module_load_attempts: u32,
}

fn default_persist() -> bool {
    true
}

fn default_module_load_attempts() -> u32 {
    3
}

fn default_offload_features() -> Vec<String> {
    ["tso", "gso", "gro", "tx", "rx", "rxvlan", "txvlan"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for StrategyPolicy {
    fn default() -> Self {
        Self {
            proactive_module_reload: false,
            persist_workaround: default_persist(),
            offload_features: default_offload_features(),
            module_load_attempts: default_module_load_attempts(),
        }
    }
}

impl StrategyPolicy {
    /// FeatureDisable when persisting, FeatureCycle otherwise
    pub fn feature_strategy(&self) -> ResetStrategy {
        if self.persist_workaround {
            ResetStrategy::FeatureDisable
        } else {
            ResetStrategy::FeatureCycle
        }
    }
}

/// Decision table, first matching row wins:
///
/// | driver          | condition                  | strategy          |
/// |-----------------|----------------------------|-------------------|
/// | e1000e          | hang or proactive policy   | ModuleReload      |
/// | Intel family    | any hang state             | feature strategy  |
/// | other           | PCI reset attribute exists | PciReset          |
/// | other           | -                          | SoftToggle        |
pub fn select_strategy(
    driver: &DriverClass,
    hang_detected: bool,
    pci_reset_available: bool,
    policy: &StrategyPolicy,
) -> ResetStrategy {
    match driver {
        DriverClass::IntelE1000E if hang_detected || policy.proactive_module_reload => {
            ResetStrategy::ModuleReload
        }
        DriverClass::IntelE1000E | DriverClass::IntelGeneric(_) => policy.feature_strategy(),
        DriverClass::Other(_) if pci_reset_available => ResetStrategy::PciReset,
        DriverClass::Other(_) => ResetStrategy::SoftToggle,
    }
}

/// Strategy for a concrete interface. Bridges and virtual interfaces only
/// ever get a link toggle.
pub fn plan_for(
    descriptor: &InterfaceDescriptor,
    hang_detected: bool,
    pci_reset_available: bool,
    policy: &StrategyPolicy,
) -> ResetStrategy {
    if descriptor.is_bridge || descriptor.is_virtual {
        return ResetStrategy::SoftToggle;
    }
    select_strategy(
        &descriptor.driver_class(),
        hang_detected,
        pci_reset_available,
        policy,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intel(name: &str) -> DriverClass {
        DriverClass::IntelGeneric(name.to_string())
    }

    fn other(name: &str) -> DriverClass {
        DriverClass::Other(Some(name.to_string()))
    }

    #[test]
    fn test_e1000e_with_hang_reloads_module() {
        let policy = StrategyPolicy::default();
        for pci in [false, true] {
            assert_eq!(
                select_strategy(&DriverClass::IntelE1000E, true, pci, &policy),
                ResetStrategy::ModuleReload
            );
        }
    }

    #[test]
    fn test_e1000e_without_hang_disables_features() {
        let policy = StrategyPolicy::default();
        assert_eq!(
            select_strategy(&DriverClass::IntelE1000E, false, true, &policy),
            ResetStrategy::FeatureDisable
        );
    }

    #[test]
    fn test_proactive_policy_reloads_without_hang() {
        let policy = StrategyPolicy {
            proactive_module_reload: true,
            ..StrategyPolicy::default()
        };
        assert_eq!(
            select_strategy(&DriverClass::IntelE1000E, false, false, &policy),
            ResetStrategy::ModuleReload
        );
        // Proactive reload is specific to the hang-prone driver
        assert_eq!(
            select_strategy(&intel("igb"), false, false, &policy),
            ResetStrategy::FeatureDisable
        );
    }

    #[test]
    fn test_intel_family_ignores_hang_and_pci() {
        let policy = StrategyPolicy::default();
        for hang in [false, true] {
            for pci in [false, true] {
                assert_eq!(
                    select_strategy(&intel("ixgbe"), hang, pci, &policy),
                    ResetStrategy::FeatureDisable
                );
            }
        }
    }

    #[test]
    fn test_no_persistence_uses_feature_cycle() {
        let policy = StrategyPolicy {
            persist_workaround: false,
            ..StrategyPolicy::default()
        };
        assert_eq!(
            select_strategy(&intel("igc"), true, false, &policy),
            ResetStrategy::FeatureCycle
        );
    }

    #[test]
    fn test_other_drivers() {
        let policy = StrategyPolicy::default();
        assert_eq!(
            select_strategy(&other("r8169"), true, true, &policy),
            ResetStrategy::PciReset
        );
        assert_eq!(
            select_strategy(&other("r8169"), true, false, &policy),
            ResetStrategy::SoftToggle
        );
        assert_eq!(
            select_strategy(&DriverClass::Other(None), false, false, &policy),
            ResetStrategy::SoftToggle
        );
    }

    #[test]
    fn test_selection_is_deterministic() {
        let policy = StrategyPolicy::default();
        let drivers = [DriverClass::IntelE1000E, intel("igb"), other("tg3"), DriverClass::Other(None)];
        for driver in &drivers {
            for hang in [false, true] {
                for pci in [false, true] {
                    let first = select_strategy(driver, hang, pci, &policy);
                    for _ in 0..5 {
                        assert_eq!(select_strategy(driver, hang, pci, &policy), first);
                    }
                }
            }
        }
    }

    #[test]
    fn test_bridges_and_virtual_only_toggle() {
        let policy = StrategyPolicy::default();
        let bridge = InterfaceDescriptor {
            name: "vmbr0".to_string(),
            is_bridge: true,
            driver: Some("bridge".to_string()),
            is_virtual: true,
        };
        assert_eq!(plan_for(&bridge, true, true, &policy), ResetStrategy::SoftToggle);

        let virtual_intel = InterfaceDescriptor {
            name: "eno1v0".to_string(),
            is_bridge: false,
            driver: Some("e1000e".to_string()),
            is_virtual: true,
        };
        assert_eq!(
            plan_for(&virtual_intel, true, false, &policy),
            ResetStrategy::SoftToggle
        );

        let physical = InterfaceDescriptor {
            is_virtual: false,
            ..virtual_intel
        };
        assert_eq!(
            plan_for(&physical, true, false, &policy),
            ResetStrategy::ModuleReload
        );
    }
}

//! Reset executor
//!
//! Runs the strategy chosen by `strategy::plan_for`. Individual sub-steps
//! (one ethtool feature, one link transition) may fail without aborting the
//! strategy; the outcome is successful when at least one corrective action
//! was verifiably applied.

use crate::config::RecoveryConfig;
use crate::hang::HangEvidence;
use crate::host::{LinkState, NetHost};
use crate::strategy::{plan_for, ResetStrategy};
use crate::topology::InterfaceDescriptor;
use crate::workaround::{PersistentWorkaroundRecord, WorkaroundWriter};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Result of one reset on one interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetOutcome {
    pub interface: String,
    pub strategy_used: ResetStrategy,
    pub succeeded: bool,
    /// Set when the planned strategy could not run and this one replaced it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_from: Option<ResetStrategy>,
    /// Corrective actions that were applied, in order
    pub actions: Vec<String>,
    /// Offload features switched off
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features_applied: Vec<String>,
    /// Boot-time unit written or confirmed for this interface
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workaround_unit: Option<String>,
}

impl ResetOutcome {
    fn new(interface: &str, strategy: ResetStrategy) -> Self {
        Self {
            interface: interface.to_string(),
            strategy_used: strategy,
            succeeded: false,
            fallback_from: None,
            actions: Vec::new(),
            features_applied: Vec::new(),
            workaround_unit: None,
        }
    }

    /// Success through a weaker substitute for the planned strategy
    pub fn is_degraded(&self) -> bool {
        self.succeeded && self.fallback_from.is_some()
    }
}

pub struct ResetExecutor<'a, H: NetHost + ?Sized> {
    host: &'a H,
    config: &'a RecoveryConfig,
}

impl<'a, H: NetHost + ?Sized> ResetExecutor<'a, H> {
    pub fn new(host: &'a H, config: &'a RecoveryConfig) -> Self {
        Self { host, config }
    }

    /// Strategy that `reset` would run, without running it
    pub fn plan(&self, descriptor: &InterfaceDescriptor, hang_detected: bool) -> ResetStrategy {
        let pci = !descriptor.is_virtual && self.host.pci_reset_available(&descriptor.name);
        plan_for(descriptor, hang_detected, pci, &self.config.policy)
    }

    /// Pick and run a strategy for the interface
    pub fn reset(&self, descriptor: &InterfaceDescriptor, hang_detected: bool) -> ResetOutcome {
        let strategy = self.plan(descriptor, hang_detected);
        info!(
            "Resetting {} with {} (driver: {}, hang: {})",
            descriptor.name,
            strategy,
            descriptor.driver_label(),
            hang_detected
        );
        self.execute(descriptor, strategy)
    }

    /// Reset with hang evidence already gathered
    pub fn reset_with_evidence(
        &self,
        descriptor: &InterfaceDescriptor,
        evidence: &HangEvidence,
    ) -> ResetOutcome {
        self.reset(descriptor, evidence.found)
    }

    /// Run a specific strategy
    pub fn execute(&self, descriptor: &InterfaceDescriptor, strategy: ResetStrategy) -> ResetOutcome {
        let outcome = match strategy {
            ResetStrategy::SoftToggle => self.soft_toggle(descriptor),
            ResetStrategy::FeatureCycle => self.feature_mitigation(descriptor, false),
            ResetStrategy::FeatureDisable => self.feature_mitigation(descriptor, true),
            ResetStrategy::ModuleReload => self.module_reload(descriptor),
            ResetStrategy::PciReset => self.pci_reset(descriptor),
        };

        if outcome.is_degraded() {
            warn!(
                "{}: {} did not complete, {} applied instead",
                outcome.interface,
                outcome.fallback_from.map(|s| s.as_str()).unwrap_or("-"),
                outcome.strategy_used
            );
        } else if outcome.succeeded {
            info!("{}: {} applied", outcome.interface, outcome.strategy_used);
        } else {
            error!(
                "{}: {} failed, no corrective action could be applied",
                outcome.interface, outcome.strategy_used
            );
        }
        outcome
    }

    fn set_link(&self, name: &str, state: LinkState, outcome: &mut ResetOutcome) -> bool {
        match self.host.set_link(name, state) {
            Ok(()) => {
                outcome.actions.push(format!("link {}", state.as_str()));
                true
            }
            Err(e) => {
                warn!("Failed to set {} {}: {}", name, state.as_str(), e);
                false
            }
        }
    }

    fn soft_toggle(&self, descriptor: &InterfaceDescriptor) -> ResetOutcome {
        let mut outcome = ResetOutcome::new(&descriptor.name, ResetStrategy::SoftToggle);
        let down = self.set_link(&descriptor.name, LinkState::Down, &mut outcome);
        self.host.settle(self.config.settle.link(descriptor.is_bridge));
        let up = self.set_link(&descriptor.name, LinkState::Up, &mut outcome);
        outcome.succeeded = down && up;
        outcome
    }

    /// Switch off each offload feature; returns the ones that took effect
    fn disable_features(&self, name: &str, outcome: &mut ResetOutcome) -> Vec<String> {
        let mut applied = Vec::new();
        for feature in &self.config.policy.offload_features {
            match self.host.set_feature(name, feature, false) {
                Ok(()) => applied.push(feature.clone()),
                Err(e) => warn!("ethtool {} off on {} failed: {}", feature, name, e),
            }
        }

        if !applied.is_empty() {
            outcome
                .actions
                .push(format!("offload off: {}", applied.join(" ")));
        }
        outcome.features_applied.extend(applied.iter().cloned());
        applied
    }

    fn persist_features(&self, name: &str, outcome: &mut ResetOutcome) {
        let record = PersistentWorkaroundRecord::new(
            name,
            &self.config.policy.offload_features,
            &self.config.workaround,
        );
        let writer = WorkaroundWriter::new(self.host, &self.config.workaround);
        match writer.install(&record) {
            Ok(install) => {
                outcome
                    .actions
                    .push(format!("boot unit {} ({:?})", install.unit, install.write));
                outcome.workaround_unit = Some(install.unit);
            }
            // Runtime mitigation stays in place even if persistence fails
            Err(e) => warn!("Could not persist workaround for {}: {}", name, e),
        }
    }

    /// Disable offloads, optionally persisting them. Returns whether any
    /// feature was applied.
    fn apply_features(&self, name: &str, persist: bool, outcome: &mut ResetOutcome) -> bool {
        let applied = self.disable_features(name, outcome);
        if applied.is_empty() {
            return false;
        }
        if persist {
            self.persist_features(name, outcome);
        }
        true
    }

    /// Link bounce followed by the offload disable. Success means at least
    /// one feature was applied.
    fn feature_mitigation(&self, descriptor: &InterfaceDescriptor, persist: bool) -> ResetOutcome {
        let strategy = if persist {
            ResetStrategy::FeatureDisable
        } else {
            ResetStrategy::FeatureCycle
        };
        let name = &descriptor.name;
        let mut outcome = ResetOutcome::new(name, strategy);

        self.set_link(name, LinkState::Down, &mut outcome);
        self.host.settle(self.config.settle.link(descriptor.is_bridge));
        self.set_link(name, LinkState::Up, &mut outcome);

        outcome.succeeded = self.apply_features(name, persist, &mut outcome);
        outcome
    }

    /// `modprobe <module>` up to `module_load_attempts` times
    fn load_module(&self, module: &str, name: &str) -> bool {
        let attempts = self.config.policy.module_load_attempts.max(1);
        for attempt in 1..=attempts {
            match self.host.load_module(module) {
                Ok(()) => return true,
                Err(e) => {
                    error!(
                        "Loading {} failed ({}/{}), {} may be gone: {}",
                        module, attempt, attempts, name, e
                    );
                    if attempt < attempts {
                        self.host.settle(self.config.settle.module());
                    }
                }
            }
        }
        false
    }

    fn module_reload(&self, descriptor: &InterfaceDescriptor) -> ResetOutcome {
        let name = &descriptor.name;
        let Some(module) = descriptor.driver.as_deref() else {
            warn!("{} has no driver module to reload, toggling link instead", name);
            let mut outcome = self.soft_toggle(descriptor);
            outcome.fallback_from = Some(ResetStrategy::ModuleReload);
            return outcome;
        };

        let mut outcome = ResetOutcome::new(name, ResetStrategy::ModuleReload);
        self.set_link(name, LinkState::Down, &mut outcome);

        if let Err(e) = self.host.unload_module(module) {
            // Module busy: a stable feature set still mitigates the hang
            warn!(
                "Could not unload {} ({}), falling back to offload disable",
                module, e
            );
            self.set_link(name, LinkState::Up, &mut outcome);
            let persist = self.config.policy.persist_workaround;
            let mut fallback = ResetOutcome::new(name, self.config.policy.feature_strategy());
            fallback.fallback_from = Some(ResetStrategy::ModuleReload);
            fallback.actions = std::mem::take(&mut outcome.actions);
            fallback.succeeded = self.apply_features(name, persist, &mut fallback);
            return fallback;
        }
        outcome.actions.push(format!("unloaded {}", module));
        self.host.settle(self.config.settle.module());

        if !self.load_module(module, name) {
            error!("{} left without its driver, manual modprobe {} required", name, module);
            self.set_link(name, LinkState::Up, &mut outcome);
            return outcome;
        }
        outcome.actions.push(format!("loaded {}", module));
        self.host.settle(self.config.settle.module());

        self.set_link(name, LinkState::Up, &mut outcome);
        outcome.succeeded = true;

        // Supplemental offload disable for the Intel family
        if descriptor.driver_class().is_intel() {
            let persist = self.config.policy.persist_workaround;
            self.apply_features(name, persist, &mut outcome);
        }
        outcome
    }

    fn pci_reset(&self, descriptor: &InterfaceDescriptor) -> ResetOutcome {
        let name = &descriptor.name;
        let mut outcome = ResetOutcome::new(name, ResetStrategy::PciReset);

        match self.host.pci_reset(name) {
            Ok(()) => {
                outcome.actions.push("pci function reset".to_string());
                self.host.settle(self.config.settle.pci());
                self.set_link(name, LinkState::Up, &mut outcome);
                outcome.succeeded = true;
                outcome
            }
            Err(e) => {
                warn!("PCI reset of {} failed ({}), toggling link instead", name, e);
                let mut fallback = self.soft_toggle(descriptor);
                fallback.fallback_from = Some(ResetStrategy::PciReset);
                fallback
            }
        }
    }
}

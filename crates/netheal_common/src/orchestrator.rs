//! Recovery orchestrator
//!
//! Idle -> CheckingConnectivity -> (healthy) ConfirmPrompt -> exit
//!                              -> (unhealthy) Resolving -> ResettingMembers
//!   -> ResettingPrimary -> RestartingNetworkService -> RenewingDhcp
//!   -> Verifying -> Success | retry | Failed
//!
//! Every attempt re-resolves the topology. The cancel flag is honoured only
//! between attempts so an in-flight module reload is never torn down.

use crate::config::RecoveryConfig;
use crate::error::RecoveryError;
use crate::hang::HangDetector;
use crate::host::NetHost;
use crate::reset::{ResetExecutor, ResetOutcome};
use crate::strategy::ResetStrategy;
use crate::topology::{InterfaceDescriptor, TopologyResolver};
use crate::verify::{DiagnosticsDump, VerificationOutcome, Verifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPhase {
    CheckingConnectivity,
    ConfirmPrompt,
    Resolving,
    ResettingMembers,
    ResettingPrimary,
    RestartingNetworkService,
    RenewingDhcp,
    Verifying,
}

impl fmt::Display for RecoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecoveryPhase::CheckingConnectivity => "checking connectivity",
            RecoveryPhase::ConfirmPrompt => "confirm",
            RecoveryPhase::Resolving => "resolving topology",
            RecoveryPhase::ResettingMembers => "resetting bridge members",
            RecoveryPhase::ResettingPrimary => "resetting interface",
            RecoveryPhase::RestartingNetworkService => "restarting network service",
            RecoveryPhase::RenewingDhcp => "renewing DHCP lease",
            RecoveryPhase::Verifying => "verifying",
        };
        f.write_str(name)
    }
}

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    /// Connectivity was fine and the operator declined to proceed
    Declined,
    Recovered,
    Failed,
    /// Stopped by a signal between attempts
    Interrupted,
}

impl RecoveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStatus::Declined => "declined",
            RecoveryStatus::Recovered => "recovered",
            RecoveryStatus::Failed => "failed",
            RecoveryStatus::Interrupted => "interrupted",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            RecoveryStatus::Declined | RecoveryStatus::Recovered => 0,
            RecoveryStatus::Failed | RecoveryStatus::Interrupted => 1,
        }
    }
}

/// Everything done in one pass of the recovery sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptReport {
    pub attempt: u32,
    /// `None` when the interface could not be resolved this attempt
    pub interface: Option<InterfaceDescriptor>,
    /// Virtual bridge members left alone
    pub skipped_members: Vec<String>,
    /// Member resets first, in enumeration order, then the interface itself
    pub resets: Vec<ResetOutcome>,
    pub service_restarted: Option<String>,
    pub dhcp_renewed: bool,
    pub verification: VerificationOutcome,
}

impl AttemptReport {
    fn new(attempt: u32) -> Self {
        Self {
            attempt,
            interface: None,
            skipped_members: Vec::new(),
            resets: Vec::new(),
            service_restarted: None,
            dhcp_renewed: false,
            verification: VerificationOutcome::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub interface: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RecoveryStatus,
    pub attempts: Vec<AttemptReport>,
    /// Boot-time units created or confirmed during the run
    pub workaround_units: Vec<String>,
    /// Final diagnostics when recovery failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<DiagnosticsDump>,
}

impl RecoveryReport {
    fn new(interface: &str) -> Self {
        Self {
            interface: interface.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            status: RecoveryStatus::Failed,
            attempts: Vec::new(),
            workaround_units: Vec::new(),
            diagnostics: None,
        }
    }

    fn finish(mut self, status: RecoveryStatus) -> Self {
        self.status = status;
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    /// All reset outcomes across attempts, in execution order
    pub fn resets(&self) -> impl Iterator<Item = &ResetOutcome> {
        self.attempts.iter().flat_map(|a| a.resets.iter())
    }
}

/// Operator checklist printed when recovery gives up
pub fn manual_steps(report: &RecoveryReport) -> Vec<String> {
    let iface = &report.interface;
    let mut steps = vec![
        format!("Check the cable and switch port LEDs for {}", iface),
        format!("Inspect driver messages: dmesg -T | grep -i {}", iface),
        format!("Check addressing and routes: ip addr show {} && ip route", iface),
        "Restart networking by hand: systemctl restart networking".to_string(),
    ];
    for unit in &report.workaround_units {
        steps.push(format!(
            "Boot-time workaround is installed, check it with: systemctl status {}",
            unit
        ));
    }
    steps.push("If the controller stays hung, reboot the host and check NIC firmware".to_string());
    steps
}

/// Asks the operator whether to run recovery on a healthy network
pub trait Confirm {
    fn confirm(&self, question: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, question: &str) -> bool {
        self(question)
    }
}

/// Per-run switches from the caller
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Skip the initial connectivity check and always recover
    pub force: bool,
}

pub struct RecoveryEngine<H: NetHost> {
    host: H,
    config: RecoveryConfig,
    cancel: Arc<AtomicBool>,
}

impl<H: NetHost> RecoveryEngine<H> {
    pub fn new(host: H, config: RecoveryConfig) -> Self {
        Self {
            host,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an external interrupt flag (set from a signal handler)
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    fn enter(&self, phase: RecoveryPhase) {
        debug!("phase: {}", phase);
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Requested interface, or the default-route / first non-loopback one
    pub fn resolve_target(&self, requested: Option<&str>) -> Result<String, RecoveryError> {
        let interface = match requested {
            Some(name) => name.to_string(),
            None => TopologyResolver::new(&self.host).default_interface()?,
        };

        if !self.host.interface_exists(&interface) {
            return Err(RecoveryError::InterfaceNotFound(interface));
        }
        Ok(interface)
    }

    /// Full recovery run
    pub fn run(
        &self,
        requested: Option<&str>,
        options: RunOptions,
        confirm: &dyn Confirm,
    ) -> Result<RecoveryReport, RecoveryError> {
        if !self.host.is_root() {
            return Err(RecoveryError::NotRoot);
        }
        let interface = self.resolve_target(requested)?;
        info!("Starting network recovery for {}", interface);
        let mut report = RecoveryReport::new(&interface);

        if !options.force {
            self.enter(RecoveryPhase::CheckingConnectivity);
            let verifier = Verifier::new(&self.host, &self.config.verify);
            if verifier.quick_check() {
                info!("Network connectivity is already working");
                self.enter(RecoveryPhase::ConfirmPrompt);
                let question = format!(
                    "Network on {} is working. Run recovery anyway?",
                    interface
                );
                if !confirm.confirm(&question) {
                    info!("Recovery not needed, leaving {} untouched", interface);
                    return Ok(report.finish(RecoveryStatus::Declined));
                }
            } else {
                warn!("Connectivity check failed, recovering {}", interface);
            }
        }

        let max = self.config.max_retries.max(1);
        for attempt in 1..=max {
            if self.cancelled() {
                warn!("Interrupted before attempt {}/{}", attempt, max);
                return Ok(report.finish(RecoveryStatus::Interrupted));
            }

            info!("Recovery attempt {}/{} on {}", attempt, max, interface);
            let attempt_report = self.run_attempt(&interface, attempt);

            for unit in attempt_report
                .resets
                .iter()
                .filter_map(|r| r.workaround_unit.as_ref())
            {
                if !report.workaround_units.contains(unit) {
                    report.workaround_units.push(unit.clone());
                }
            }

            let verified = attempt_report.verification.reachable;
            report.diagnostics = attempt_report.verification.diagnostics.clone();
            report.attempts.push(attempt_report);

            if verified {
                info!("Network on {} recovered on attempt {}", interface, attempt);
                report.diagnostics = None;
                return Ok(report.finish(RecoveryStatus::Recovered));
            }

            if attempt < max {
                warn!(
                    "Attempt {} did not restore connectivity, retrying in {}s",
                    attempt, self.config.retry_delay_secs
                );
                self.host.settle(self.config.retry_delay());
            }
        }

        error!("Network recovery on {} failed after {} attempts", interface, max);
        error!("Manual intervention required:");
        for step in manual_steps(&report) {
            error!("  - {}", step);
        }
        Ok(report.finish(RecoveryStatus::Failed))
    }

    fn run_attempt(&self, interface: &str, attempt: u32) -> AttemptReport {
        let mut report = AttemptReport::new(attempt);
        let resolver = TopologyResolver::new(&self.host);
        let detector = HangDetector::new(&self.host, &self.config.hang);
        let executor = ResetExecutor::new(&self.host, &self.config);

        self.enter(RecoveryPhase::Resolving);
        match resolver.resolve(interface) {
            Ok(descriptor) => {
                if descriptor.is_bridge {
                    self.enter(RecoveryPhase::ResettingMembers);
                    let topology = resolver.topology(interface);
                    info!(
                        "Bridge {} has {} member(s)",
                        topology.bridge_name,
                        topology.members.len()
                    );
                    // Sequential, in enumeration order
                    for member in &topology.members {
                        if member.is_virtual {
                            info!("Skipping virtual bridge member {}", member.name);
                            report.skipped_members.push(member.name.clone());
                            continue;
                        }
                        let evidence = detector.detect(&member.name);
                        report
                            .resets
                            .push(executor.reset_with_evidence(member, &evidence));
                    }
                }

                self.enter(RecoveryPhase::ResettingPrimary);
                let hang = !descriptor.is_virtual && detector.detect(&descriptor.name).found;
                report.resets.push(executor.reset(&descriptor, hang));
                report.interface = Some(descriptor);
            }
            Err(e) => error!("Cannot resolve {} this attempt: {}", interface, e),
        }

        // Lease state is independent of whether the resets succeeded
        self.enter(RecoveryPhase::RestartingNetworkService);
        report.service_restarted = self.restart_network_service();

        self.enter(RecoveryPhase::RenewingDhcp);
        report.dhcp_renewed = self.renew_dhcp(interface);

        self.enter(RecoveryPhase::Verifying);
        let is_bridge = report
            .interface
            .as_ref()
            .map(|d| d.is_bridge)
            .unwrap_or(false);
        report.verification =
            Verifier::new(&self.host, &self.config.verify).verify(interface, is_bridge);
        report
    }

    fn restart_network_service(&self) -> Option<String> {
        let unit = self
            .config
            .network_services
            .iter()
            .find(|unit| self.host.service_active(unit));

        let Some(unit) = unit else {
            warn!(
                "None of the network services is active: {}",
                self.config.network_services.join(", ")
            );
            return None;
        };

        match self.host.restart_service(unit) {
            Ok(()) => {
                info!("Restarted {}", unit);
                self.host.settle(self.config.settle.service());
                Some(unit.clone())
            }
            Err(e) => {
                warn!("Restarting {} failed: {}", unit, e);
                None
            }
        }
    }

    fn renew_dhcp(&self, interface: &str) -> bool {
        match self.host.renew_dhcp(interface, self.config.dhcp_timeout()) {
            Ok(()) => {
                info!("Renewed DHCP lease on {}", interface);
                true
            }
            Err(e) => {
                warn!("DHCP renewal on {} failed: {}", interface, e);
                false
            }
        }
    }

    /// Apply the persistent offload workaround to one interface, no retry
    /// loop and no verification.
    pub fn apply_workaround(&self, requested: &str) -> Result<ResetOutcome, RecoveryError> {
        if !self.host.is_root() {
            return Err(RecoveryError::NotRoot);
        }
        let interface = self.resolve_target(Some(requested))?;
        let descriptor = TopologyResolver::new(&self.host).resolve(&interface)?;
        if descriptor.is_virtual {
            warn!(
                "{} is virtual, offload settings may not reach any hardware",
                descriptor.name
            );
        }

        let executor = ResetExecutor::new(&self.host, &self.config);
        Ok(executor.execute(&descriptor, ResetStrategy::FeatureDisable))
    }
}

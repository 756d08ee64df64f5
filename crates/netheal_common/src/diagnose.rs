//! Read-only diagnosis
//!
//! Shows what a recovery run would do: topology, hang evidence and the
//! planned strategy per interface. Nothing is changed.

use crate::config::RecoveryConfig;
use crate::error::RecoveryError;
use crate::hang::{HangDetector, HangEvidence};
use crate::host::{DefaultRoute, NetHost};
use crate::reset::ResetExecutor;
use crate::strategy::ResetStrategy;
use crate::topology::{InterfaceDescriptor, TopologyResolver};
use crate::verify::Verifier;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceRole {
    Primary,
    BridgeMember,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceDiagnosis {
    pub role: InterfaceRole,
    pub descriptor: InterfaceDescriptor,
    pub pci_reset_available: bool,
    /// Not scanned for virtual interfaces
    pub hang: Option<HangEvidence>,
    /// `None` for bridge members that would be skipped
    pub planned_strategy: Option<ResetStrategy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisReport {
    pub interface: String,
    pub connectivity: bool,
    pub default_route: Option<DefaultRoute>,
    pub interfaces: Vec<InterfaceDiagnosis>,
}

impl DiagnosisReport {
    pub fn hang_detected(&self) -> bool {
        self.interfaces
            .iter()
            .any(|i| i.hang.as_ref().map(|h| h.found).unwrap_or(false))
    }
}

/// Diagnose `interface` and, for bridges, each member
pub fn diagnose<H: NetHost + ?Sized>(
    host: &H,
    config: &RecoveryConfig,
    interface: &str,
) -> Result<DiagnosisReport, RecoveryError> {
    let resolver = TopologyResolver::new(host);
    let detector = HangDetector::new(host, &config.hang);
    let executor = ResetExecutor::new(host, config);

    let inspect = |descriptor: InterfaceDescriptor, role: InterfaceRole| {
        let pci_reset_available = !descriptor.is_virtual && host.pci_reset_available(&descriptor.name);
        let hang = if descriptor.is_virtual {
            None
        } else {
            Some(detector.detect(&descriptor.name))
        };
        let found = hang.as_ref().map(|h| h.found).unwrap_or(false);
        let planned_strategy = if role == InterfaceRole::BridgeMember && descriptor.is_virtual {
            None
        } else {
            Some(executor.plan(&descriptor, found))
        };
        InterfaceDiagnosis {
            role,
            descriptor,
            pci_reset_available,
            hang,
            planned_strategy,
        }
    };

    let primary = resolver.resolve(interface)?;
    let mut interfaces = Vec::new();
    if primary.is_bridge {
        for member in resolver.topology(interface).members {
            interfaces.push(inspect(member, InterfaceRole::BridgeMember));
        }
    }
    interfaces.push(inspect(primary, InterfaceRole::Primary));

    let connectivity = Verifier::new(host, &config.verify).quick_check();

    Ok(DiagnosisReport {
        interface: interface.to_string(),
        connectivity,
        default_route: host.default_route(),
        interfaces,
    })
}

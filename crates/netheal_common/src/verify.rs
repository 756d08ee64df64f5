//! Connectivity verification
//!
//! Probes a primary target up to N times (more for bridges). Once the
//! primary has failed often enough, each further attempt also probes the
//! default gateway (diagnostic only) and the alternative targets. Any
//! reachable target means the interface itself recovered.

use crate::config::VerifyConfig;
use crate::host::NetHost;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    Primary,
    Gateway,
    Alternative,
}

/// One probe within a verification pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub attempt: u32,
    pub target: String,
    pub kind: ProbeKind,
    pub reachable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub reachable: bool,
    pub results: Vec<VerificationResult>,
    /// Captured only when verification gave up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<DiagnosticsDump>,
}

impl VerificationOutcome {
    /// Target that proved connectivity, if any
    pub fn reached_target(&self) -> Option<&str> {
        self.results
            .iter()
            .find(|r| r.reachable && r.kind != ProbeKind::Gateway)
            .map(|r| r.target.as_str())
    }
}

/// Operator-facing state captured after verification gave up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsDump {
    pub interface: String,
    pub address_state: Option<String>,
    pub routes: Option<String>,
    pub dns_host: String,
    pub dns_resolved: bool,
}

pub struct Verifier<'a, H: NetHost + ?Sized> {
    host: &'a H,
    config: &'a VerifyConfig,
}

impl<'a, H: NetHost + ?Sized> Verifier<'a, H> {
    pub fn new(host: &'a H, config: &'a VerifyConfig) -> Self {
        Self { host, config }
    }

    fn probe(
        &self,
        attempt: u32,
        target: &str,
        kind: ProbeKind,
        results: &mut Vec<VerificationResult>,
    ) -> bool {
        let reachable = self.host.ping(target, self.config.probe_timeout());
        debug!(
            "probe {} {:?} {}: {}",
            attempt,
            kind,
            target,
            if reachable { "ok" } else { "no reply" }
        );
        results.push(VerificationResult {
            attempt,
            target: target.to_string(),
            kind,
            reachable,
        });
        reachable
    }

    /// One pass over the primary and alternative targets, no retries
    pub fn quick_check(&self) -> bool {
        let mut results = Vec::new();
        if self.probe(0, &self.config.primary_target, ProbeKind::Primary, &mut results) {
            return true;
        }
        self.config
            .alternative_targets
            .iter()
            .any(|target| self.probe(0, target, ProbeKind::Alternative, &mut results))
    }

    /// Bounded verification loop
    pub fn verify(&self, interface: &str, is_bridge: bool) -> VerificationOutcome {
        let attempts = self.config.attempts_for(is_bridge);
        let delay = self.config.delay_for(is_bridge);
        let mut results = Vec::new();

        info!(
            "Verifying connectivity on {} (up to {} attempts)",
            interface, attempts
        );

        for attempt in 1..=attempts {
            if self.probe(
                attempt,
                &self.config.primary_target,
                ProbeKind::Primary,
                &mut results,
            ) {
                info!(
                    "{} reachable on attempt {}/{}",
                    self.config.primary_target, attempt, attempts
                );
                return VerificationOutcome {
                    reachable: true,
                    results,
                    diagnostics: None,
                };
            }

            if attempt >= self.config.alternative_after {
                if self.alternative_diagnostics(interface, attempt, &mut results) {
                    return VerificationOutcome {
                        reachable: true,
                        results,
                        diagnostics: None,
                    };
                }
            } else {
                debug!(
                    "{} unreachable (attempt {}/{})",
                    self.config.primary_target, attempt, attempts
                );
            }

            if attempt < attempts {
                self.host.settle(delay);
            }
        }

        warn!(
            "Connectivity on {} not confirmed after {} attempts",
            interface, attempts
        );
        let dump = self.diagnostics(interface);

        VerificationOutcome {
            reachable: false,
            results,
            diagnostics: Some(dump),
        }
    }

    /// Gateway probe (logged only) and alternative targets (decisive)
    fn alternative_diagnostics(
        &self,
        interface: &str,
        attempt: u32,
        results: &mut Vec<VerificationResult>,
    ) -> bool {
        match self.host.default_route().and_then(|r| r.gateway) {
            Some(gateway) => {
                if self.probe(attempt, &gateway, ProbeKind::Gateway, results) {
                    info!(
                        "Gateway {} reachable via {}: link is up, upstream routing or DNS is failing",
                        gateway, interface
                    );
                } else {
                    warn!("Gateway {} unreachable: link on {} looks down", gateway, interface);
                }
            }
            None => warn!("No default gateway configured"),
        }

        for target in &self.config.alternative_targets {
            if self.probe(attempt, target, ProbeKind::Alternative, results) {
                info!(
                    "Alternative target {} reachable, treating {} as recovered",
                    target, interface
                );
                return true;
            }
        }
        false
    }

    /// Address, route and DNS state for the log. Has no effect on results.
    pub fn diagnostics(&self, interface: &str) -> DiagnosticsDump {
        let address_state = match self.host.address_state(interface) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("ip addr show {} failed: {}", interface, e);
                None
            }
        };
        let routes = match self.host.routing_table() {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("ip route show failed: {}", e);
                None
            }
        };
        let dns_host = self.config.dns_test_host.clone();
        let dns_resolved = self.host.resolve_host(&dns_host).is_ok();

        warn!("=== Diagnostics for {} ===", interface);
        for line in address_state.as_deref().unwrap_or("(unavailable)").lines() {
            warn!("addr: {}", line);
        }
        for line in routes.as_deref().unwrap_or("(unavailable)").lines() {
            warn!("route: {}", line);
        }
        warn!(
            "dns: {} {}",
            dns_host,
            if dns_resolved { "resolves" } else { "does not resolve" }
        );

        DiagnosticsDump {
            interface: interface.to_string(),
            address_state,
            routes,
            dns_host,
            dns_resolved,
        }
    }
}

//! netheal common - Network interface recovery engine
//!
//! Detects a degraded or hung link and restores it through increasingly
//! invasive repair actions, verifying connectivity after each attempt.
//!
//! Layering (leaf first):
//! - `host`: OS primitives behind the `NetHost` trait
//! - `topology`: bridge/physical/virtual classification and driver lookup
//! - `hang`: kernel/journal hang signature scan
//! - `strategy` + `reset`: reset strategy selection and execution
//! - `workaround`: boot-time feature-disable unit
//! - `verify`: multi-target connectivity verification
//! - `orchestrator`: the retry loop tying it together

pub mod config;
pub mod diagnose;
pub mod error;
pub mod hang;
pub mod host;
pub mod orchestrator;
pub mod reset;
pub mod strategy;
pub mod topology;
pub mod verify;
pub mod workaround;

pub use config::RecoveryConfig;
pub use diagnose::{diagnose, DiagnosisReport};
pub use error::{ConfigError, HostError, RecoveryError};
pub use host::{DefaultRoute, DryRunHost, LinkState, NetHost, SystemHost};
pub use orchestrator::{Confirm, RecoveryEngine, RecoveryReport, RecoveryStatus, RunOptions};
pub use reset::{ResetExecutor, ResetOutcome};
pub use strategy::{ResetStrategy, StrategyPolicy};
pub use topology::{DriverClass, InterfaceDescriptor};

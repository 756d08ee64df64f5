//! Error types for the recovery engine

use thiserror::Error;

/// Failure of a single OS primitive (command, sysfs read/write)
#[derive(Debug, Error)]
pub enum HostError {
    #[error("`{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("command not found: {0}")]
    CommandMissing(String),

    #[error("{what} unavailable: {reason}")]
    Unavailable { what: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that stop a recovery run before any repair is attempted
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("network recovery must run as root")]
    NotRoot,

    #[error("interface {0} not found")]
    InterfaceNotFound(String),

    #[error("no usable network interface found (no default route, no non-loopback interface)")]
    NoInterface,

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

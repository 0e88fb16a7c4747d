//! Error types for tuner construction and control

use thiserror::Error;

/// Errors reported by the external DSP runtime or hardware driver
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("invalid connection: {0}")]
    InvalidConnection(String),

    #[error("flow graph already running")]
    AlreadyRunning,

    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by the tuner core
#[derive(Debug, Error)]
pub enum TunerError {
    /// Rate combination or filter parameters that cannot produce a working chain
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("a station scan is already in progress")]
    ScanInProgress,
}

impl TunerError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        TunerError::InvalidConfig(msg.into())
    }
}

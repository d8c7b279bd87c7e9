//! Error handling module
//!
//! Startup and session failures of the probe binary. Flow failures keep their
//! own [`FlowError`] and are wrapped unchanged.

use std::path::PathBuf;

use action_flow::FlowError;
use cdp_adapter::AdapterError;
use stealth::{config::ConfigError as StealthConfigError, StealthError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    /// Configuration missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Browser could not be launched or prepared
    #[error("Browser error: {0}")]
    Browser(#[from] AdapterError),

    #[error("Stealth error: {0}")]
    Stealth(#[from] StealthError),

    #[error("Stealth profile bundle error: {0}")]
    StealthBundle(#[from] StealthConfigError),

    #[error(transparent)]
    Flow(#[from] FlowError),
}

impl ProbeError {
    pub fn config(message: impl Into<String>) -> Self {
        ProbeError::Config(message.into())
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProbeError::Config(_) | ProbeError::Io { .. } | ProbeError::StealthBundle(_) => 2,
            ProbeError::Flow(FlowError::InvalidConfig(_)) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_errors_exit_with_two() {
        assert_eq!(ProbeError::config("location.city is required").exit_code(), 2);
        assert_eq!(
            ProbeError::Flow(FlowError::Aborted("boom".into())).exit_code(),
            1
        );
    }
}

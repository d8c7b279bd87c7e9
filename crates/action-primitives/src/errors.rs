//! Error types for action primitives

use cdp_adapter::{AdapterError, AdapterErrorKind};
use thiserror::Error;

/// Error taxonomy for action primitive operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// Navigation did not settle before its deadline
    #[error("Navigation timeout: {0}")]
    NavTimeout(String),

    /// Wait operation timed out
    #[error("Wait timeout: {0}")]
    WaitTimeout(String),

    /// Element anchor could not be resolved
    #[error("Anchor not found: {0}")]
    AnchorNotFound(String),

    /// Element rejected the click (script error inside its handlers)
    #[error("Element not clickable: {0}")]
    NotClickable(String),

    /// CDP communication or protocol error
    #[error("CDP I/O error: {0}")]
    CdpIo(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// A retried action ran out of attempts
    #[error("Action failed on '{selector}' after {attempts} attempt(s)")]
    ActionFailed { selector: String, attempts: u32 },
}

impl ActionError {
    /// Translate an adapter failure observed while acting on `selector`.
    pub fn from_adapter(err: AdapterError, selector: Option<&str>) -> Self {
        let message = match selector {
            Some(selector) => format!("{err} (selector '{selector}')"),
            None => err.to_string(),
        };
        match err.kind {
            AdapterErrorKind::NavTimeout => ActionError::NavTimeout(message),
            AdapterErrorKind::WaitTimeout => ActionError::WaitTimeout(message),
            AdapterErrorKind::TargetNotFound => ActionError::AnchorNotFound(message),
            AdapterErrorKind::CdpIo => ActionError::CdpIo(message),
            AdapterErrorKind::Internal => ActionError::Internal(message),
        }
    }

    /// Timeouts are the only failures a classification wait may absorb
    pub fn is_timeout(&self) -> bool {
        matches!(self, ActionError::NavTimeout(_) | ActionError::WaitTimeout(_))
    }
}

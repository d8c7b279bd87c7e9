//! Flow execution error types

use action_primitives::ActionError;
use thiserror::Error;

use crate::types::FlowStep;

/// Errors that end a run before both outcomes are known
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FlowError {
    /// Run configuration rejected before the browser is touched
    #[error("Invalid run configuration: {0}")]
    InvalidConfig(String),

    /// A fatal step failed; the remaining steps were skipped
    #[error("Step '{step}' failed{}: {source}", selector_suffix(.selector))]
    StepFailed {
        step: FlowStep,
        selector: Option<String>,
        #[source]
        source: ActionError,
    },

    /// The flow panicked; caught at the session boundary
    #[error("Flow aborted: {0}")]
    Aborted(String),
}

impl FlowError {
    pub fn step(step: FlowStep, selector: Option<&str>) -> impl FnOnce(ActionError) -> FlowError {
        let selector = selector.map(str::to_string);
        move |source| FlowError::StepFailed {
            step,
            selector,
            source,
        }
    }

    /// Selector of the control a failed step was waiting on or clicking.
    pub fn selector(&self) -> Option<&str> {
        match self {
            FlowError::StepFailed { selector, .. } => selector.as_deref(),
            _ => None,
        }
    }
}

fn selector_suffix(selector: &Option<String>) -> String {
    selector
        .as_ref()
        .map(|s| format!(" on '{}'", s))
        .unwrap_or_default()
}

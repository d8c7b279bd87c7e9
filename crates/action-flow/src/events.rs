//! Observer hooks fired while a probe runs

use std::time::Duration;

use crate::types::{AvailabilityOutcome, FirstProductCheck, FlowStep};

/// Receives progress and outcomes as soon as they are known.
///
/// Outcomes are delivered before later steps run, so a fatal failure in step 10
/// cannot hide a listing verdict that step 9 already produced.
pub trait FlowEvents: Send + Sync {
    fn step_completed(&self, _step: FlowStep, _elapsed: Duration) {}

    fn availability_determined(&self, _product: &str, _outcome: &AvailabilityOutcome) {}

    fn first_product_checked(&self, _product: &str, _check: &FirstProductCheck) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFlowEvents;

impl FlowEvents for NoopFlowEvents {}

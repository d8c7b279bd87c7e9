//! Probe flow orchestration
//!
//! This crate sequences the storefront interaction over [`action_primitives`]:
//! opening the site, setting the delivery location, searching for a product,
//! classifying its availability and inspecting the first result. Availability
//! absence is reported as an outcome, never raised as an error.

pub mod errors;
pub mod events;
pub mod executor;
pub mod extractor;
pub mod session;
pub mod site;
pub mod types;

pub use errors::FlowError;
pub use events::{FlowEvents, NoopFlowEvents};
pub use executor::{FlowExecutor, ProbeFlow};
pub use extractor::AvailabilityExtractor;
pub use session::{run_in_session, Session, SessionHandle};
pub use types::{
    AvailabilityOutcome, FirstProductCheck, FlowReport, FlowState, FlowStep, FlowTimings,
    Presence, ProductRecord, RunConfig, UnavailableReason, NOT_AVAILABLE,
};

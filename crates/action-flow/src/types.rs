//! Core types for the probe flow

use action_primitives::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::errors::FlowError;

/// Placeholder for a product field missing from its card
pub const NOT_AVAILABLE: &str = "N/A";

/// Inputs of one run; immutable once validated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub city: String,
    pub product: String,
    pub timeout_ms: u64,
}

impl RunConfig {
    pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

    pub fn new(city: impl Into<String>, product: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            product: product.into(),
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn validate(&self) -> Result<(), FlowError> {
        if self.city.trim().is_empty() {
            return Err(FlowError::InvalidConfig("location.city must not be empty".into()));
        }
        if self.product.trim().is_empty() {
            return Err(FlowError::InvalidConfig(
                "location.product must not be empty".into(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(FlowError::InvalidConfig("timeout must be positive".into()));
        }
        Ok(())
    }

    /// Deadline for every fatal wait
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Step-specific timing contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowTimings {
    /// Product-card wait; exhausting it means "not available"
    pub results_timeout: Duration,
    /// Navigation after opening the first product
    pub product_page_timeout: Duration,
    /// Pause between typed characters
    pub keystroke_delay: Duration,
    pub click_retry: RetryPolicy,
}

impl Default for FlowTimings {
    fn default() -> Self {
        Self {
            results_timeout: Duration::from_millis(15_000),
            product_page_timeout: Duration::from_millis(10_000),
            keystroke_delay: Duration::from_millis(100),
            click_retry: RetryPolicy::default(),
        }
    }
}

/// Named units of work, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowStep {
    OpenSite,
    OpenLocationPrompt,
    EnterCity,
    ChooseAddress,
    ConfirmLocation,
    OpenSearch,
    EnterQuery,
    AwaitResults,
    ExtractProducts,
    CheckFirstProduct,
}

impl FlowStep {
    pub const ALL: [FlowStep; 10] = [
        FlowStep::OpenSite,
        FlowStep::OpenLocationPrompt,
        FlowStep::EnterCity,
        FlowStep::ChooseAddress,
        FlowStep::ConfirmLocation,
        FlowStep::OpenSearch,
        FlowStep::EnterQuery,
        FlowStep::AwaitResults,
        FlowStep::ExtractProducts,
        FlowStep::CheckFirstProduct,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FlowStep::OpenSite => "open-site",
            FlowStep::OpenLocationPrompt => "open-location-prompt",
            FlowStep::EnterCity => "enter-city",
            FlowStep::ChooseAddress => "choose-address",
            FlowStep::ConfirmLocation => "confirm-location",
            FlowStep::OpenSearch => "open-search",
            FlowStep::EnterQuery => "enter-query",
            FlowStep::AwaitResults => "await-results",
            FlowStep::ExtractProducts => "extract-products",
            FlowStep::CheckFirstProduct => "check-first-product",
        }
    }

    /// A timeout in a fatal step aborts the run. The later steps turn absence into
    /// an outcome and only abort on non-timeout failures.
    pub fn is_fatal(self) -> bool {
        !matches!(
            self,
            FlowStep::AwaitResults | FlowStep::ExtractProducts | FlowStep::CheckFirstProduct
        )
    }
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a wait whose timeout is an answer rather than an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Presence {
    Present,
    Absent,
}

/// One product card as rendered in the listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: String,
    pub price: String,
    pub quantity: String,
}

impl ProductRecord {
    /// Build a record, substituting [`NOT_AVAILABLE`] for each missing field.
    pub fn from_fields(
        name: Option<String>,
        price: Option<String>,
        quantity: Option<String>,
    ) -> Self {
        let or_sentinel = |value: Option<String>| value.unwrap_or_else(|| NOT_AVAILABLE.to_string());
        Self {
            name: or_sentinel(name),
            price: or_sentinel(price),
            quantity: or_sentinel(quantity),
        }
    }
}

/// Listing-level verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "products", rename_all = "snake_case")]
pub enum AvailabilityOutcome {
    Unavailable,
    Available(Vec<ProductRecord>),
}

impl AvailabilityOutcome {
    pub fn is_available(&self) -> bool {
        matches!(self, AvailabilityOutcome::Available(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// The product page has no increase-quantity control
    ControlMissing,
    /// The control is fully transparent or disabled
    ControlDisabled,
}

/// Verdict from the first product's own page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FirstProductCheck {
    Available { added_to_cart: bool },
    Unavailable { reason: UnavailableReason },
    NotFound,
}

/// Explicit flow state; each state has exactly one outgoing transition
#[derive(Debug, Clone, PartialEq)]
pub enum FlowState {
    Init,
    Loaded,
    LocationPromptOpen,
    LocationTyped,
    LocationChosen,
    LocationConfirmed,
    SearchOpened,
    QueryEntered,
    ResultsEvaluated {
        results: Presence,
    },
    Extracted {
        availability: AvailabilityOutcome,
    },
    FirstProductChecked {
        availability: AvailabilityOutcome,
        first_product: FirstProductCheck,
    },
}

impl FlowState {
    /// Step that leaves this state, or `None` once terminal.
    pub fn next_step(&self) -> Option<FlowStep> {
        let step = match self {
            FlowState::Init => FlowStep::OpenSite,
            FlowState::Loaded => FlowStep::OpenLocationPrompt,
            FlowState::LocationPromptOpen => FlowStep::EnterCity,
            FlowState::LocationTyped => FlowStep::ChooseAddress,
            FlowState::LocationChosen => FlowStep::ConfirmLocation,
            FlowState::LocationConfirmed => FlowStep::OpenSearch,
            FlowState::SearchOpened => FlowStep::EnterQuery,
            FlowState::QueryEntered => FlowStep::AwaitResults,
            FlowState::ResultsEvaluated { .. } => FlowStep::ExtractProducts,
            FlowState::Extracted { .. } => FlowStep::CheckFirstProduct,
            FlowState::FirstProductChecked { .. } => return None,
        };
        Some(step)
    }

    pub fn is_terminal(&self) -> bool {
        self.next_step().is_none()
    }
}

/// Both independently reported outcomes of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowReport {
    pub availability: AvailabilityOutcome,
    pub first_product: FirstProductCheck,
}

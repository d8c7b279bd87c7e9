//! Probe flow executor
//!
//! Drives one page through the storefront sequence as an explicit state machine:
//! every [`FlowState`] has exactly one transition, and the transition decides
//! whether a timeout is fatal or an availability answer.

use action_primitives::{click_with_retry, ActionPrimitives, WaitTier};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::FlowError;
use crate::events::FlowEvents;
use crate::extractor::AvailabilityExtractor;
use crate::site;
use crate::types::*;

/// Flow executor trait
#[async_trait]
pub trait FlowExecutor: Send + Sync {
    /// Run every step against `page`, reporting outcomes through `events`.
    async fn execute(
        &self,
        page: &dyn ActionPrimitives,
        events: &dyn FlowEvents,
    ) -> Result<FlowReport, FlowError>;
}

/// The storefront availability probe
#[derive(Debug, Clone)]
pub struct ProbeFlow {
    config: RunConfig,
    timings: FlowTimings,
    site_url: String,
    extractor: AvailabilityExtractor,
}

impl ProbeFlow {
    /// Create a flow for a validated `config`.
    pub fn new(config: RunConfig) -> Result<Self, FlowError> {
        config.validate()?;
        Ok(Self {
            config,
            timings: FlowTimings::default(),
            site_url: site::DEFAULT_SITE_URL.to_string(),
            extractor: AvailabilityExtractor::new(),
        })
    }

    pub fn with_timings(mut self, timings: FlowTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_site_url(mut self, url: impl Into<String>) -> Self {
        self.site_url = url.into();
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    /// Perform the single transition leaving `state`.
    async fn advance(
        &self,
        state: FlowState,
        page: &dyn ActionPrimitives,
        events: &dyn FlowEvents,
    ) -> Result<FlowState, FlowError> {
        let timeout = self.config.timeout();
        let product = self.config.product.as_str();

        match state {
            FlowState::Init => {
                page.navigate(&self.site_url, WaitTier::DomReady, timeout)
                    .await
                    .map_err(FlowError::step(FlowStep::OpenSite, None))?;
                match page.page_title().await {
                    Ok(title) => info!(%title, url = %self.site_url, "Site loaded"),
                    Err(err) => warn!(error = %err, "Could not read page title"),
                }
                Ok(FlowState::Loaded)
            }

            FlowState::Loaded => {
                self.click(page, FlowStep::OpenLocationPrompt, site::SELECT_LOCATION_BUTTON)
                    .await?;
                Ok(FlowState::LocationPromptOpen)
            }

            FlowState::LocationPromptOpen => {
                let input = site::ADDRESS_SEARCH_INPUT;
                let step = FlowStep::EnterCity;
                page.wait_for_visible(input, timeout)
                    .await
                    .map_err(FlowError::step(step, Some(input)))?;
                info!(city = %self.config.city, "Entering city");
                page.type_text(input, &self.config.city, self.timings.keystroke_delay, timeout)
                    .await
                    .map_err(FlowError::step(step, Some(input)))?;
                Ok(FlowState::LocationTyped)
            }

            FlowState::LocationTyped => {
                self.click(page, FlowStep::ChooseAddress, site::ADDRESS_SUGGESTION)
                    .await?;
                info!("Selected address from dropdown");
                Ok(FlowState::LocationChosen)
            }

            FlowState::LocationChosen => {
                self.click(page, FlowStep::ConfirmLocation, site::LOCATION_CONFIRM_BUTTON)
                    .await?;
                info!("Confirmed location");
                Ok(FlowState::LocationConfirmed)
            }

            FlowState::LocationConfirmed => {
                self.click(page, FlowStep::OpenSearch, site::SEARCH_BAR_ICON)
                    .await?;
                page.wait_for_navigation(WaitTier::Idle, timeout)
                    .await
                    .map_err(FlowError::step(FlowStep::OpenSearch, None))?;
                Ok(FlowState::SearchOpened)
            }

            FlowState::SearchOpened => {
                let input = site::PRODUCT_SEARCH_INPUT;
                let step = FlowStep::EnterQuery;
                page.wait_for_visible(input, timeout)
                    .await
                    .map_err(FlowError::step(step, Some(input)))?;
                page.type_text(input, product, self.timings.keystroke_delay, timeout)
                    .await
                    .map_err(FlowError::step(step, Some(input)))?;
                page.press_key(site::SUBMIT_KEY)
                    .await
                    .map_err(FlowError::step(step, None))?;
                info!(%product, "Searching for product");
                Ok(FlowState::QueryEntered)
            }

            FlowState::QueryEntered => {
                info!("Waiting for product results");
                let results = self
                    .presence(
                        page,
                        FlowStep::AwaitResults,
                        self.extractor.card_selector(),
                        self.timings.results_timeout,
                    )
                    .await?;
                Ok(FlowState::ResultsEvaluated { results })
            }

            FlowState::ResultsEvaluated { results } => {
                let availability = match results {
                    Presence::Absent => {
                        info!(%product, "Product is not available currently");
                        AvailabilityOutcome::Unavailable
                    }
                    Presence::Present => {
                        info!(%product, "Product is available, extracting details");
                        let records = self.extractor.extract(page).await.map_err(
                            FlowError::step(
                                FlowStep::ExtractProducts,
                                Some(self.extractor.card_selector()),
                            ),
                        )?;
                        AvailabilityOutcome::Available(records)
                    }
                };
                events.availability_determined(product, &availability);
                Ok(FlowState::Extracted { availability })
            }

            FlowState::Extracted { availability } => {
                let first_product = self.check_first_product(page).await?;
                events.first_product_checked(product, &first_product);
                Ok(FlowState::FirstProductChecked {
                    availability,
                    first_product,
                })
            }

            terminal @ FlowState::FirstProductChecked { .. } => Ok(terminal),
        }
    }

    async fn click(
        &self,
        page: &dyn ActionPrimitives,
        step: FlowStep,
        selector: &str,
    ) -> Result<(), FlowError> {
        click_with_retry(page, selector, self.timings.click_retry, self.config.timeout())
            .await
            .map_err(FlowError::step(step, Some(selector)))?;
        Ok(())
    }

    /// Classification wait: in a non-fatal step a timeout means [`Presence::Absent`];
    /// anything else, or any failure in a fatal step, aborts the run.
    async fn presence(
        &self,
        page: &dyn ActionPrimitives,
        step: FlowStep,
        selector: &str,
        timeout: Duration,
    ) -> Result<Presence, FlowError> {
        match page.wait_for_visible(selector, timeout).await {
            Ok(_) => Ok(Presence::Present),
            Err(err) if err.is_timeout() && !step.is_fatal() => {
                debug!(%selector, error = %err, "classification wait expired");
                Ok(Presence::Absent)
            }
            Err(err) => Err(FlowError::step(step, Some(selector))(err)),
        }
    }

    async fn check_first_product(
        &self,
        page: &dyn ActionPrimitives,
    ) -> Result<FirstProductCheck, FlowError> {
        let step = FlowStep::CheckFirstProduct;
        let anchor = site::FIRST_PRODUCT_ANCHOR;

        let anchors = page
            .count(anchor)
            .await
            .map_err(FlowError::step(step, Some(anchor)))?;
        if anchors == 0 {
            info!(product = %self.config.product, "Product not found");
            return Ok(FirstProductCheck::NotFound);
        }

        page.dom_click(anchor)
            .await
            .map_err(FlowError::step(step, Some(anchor)))?;
        page.wait_for_navigation(WaitTier::Load, self.timings.product_page_timeout)
            .await
            .map_err(FlowError::step(step, None))?;
        page.reload(WaitTier::DomReady, self.config.timeout())
            .await
            .map_err(FlowError::step(step, None))?;

        let control = site::INCREASE_QUANTITY_BUTTON;
        let check = match page
            .interactable(control)
            .await
            .map_err(FlowError::step(step, Some(control)))?
        {
            None => FirstProductCheck::Unavailable {
                reason: UnavailableReason::ControlMissing,
            },
            Some(false) => FirstProductCheck::Unavailable {
                reason: UnavailableReason::ControlDisabled,
            },
            Some(true) => {
                let added_to_cart = match page.dom_click(control).await {
                    Ok(_) => true,
                    Err(err) => {
                        warn!(selector = %control, error = %err, "Add to cart click failed");
                        false
                    }
                };
                FirstProductCheck::Available { added_to_cart }
            }
        };

        match check {
            FirstProductCheck::Available { .. } => {
                info!(product = %self.config.product, "First product is available")
            }
            _ => info!(product = %self.config.product, "First product is currently unavailable"),
        }
        Ok(check)
    }
}

#[async_trait]
impl FlowExecutor for ProbeFlow {
    async fn execute(
        &self,
        page: &dyn ActionPrimitives,
        events: &dyn FlowEvents,
    ) -> Result<FlowReport, FlowError> {
        info!(
            city = %self.config.city,
            product = %self.config.product,
            timeout_ms = self.config.timeout_ms,
            "Starting probe flow"
        );

        let mut state = FlowState::Init;
        while let Some(step) = state.next_step() {
            let started = Instant::now();
            state = self.advance(state, page, events).await?;
            let elapsed = started.elapsed();
            debug!(%step, elapsed_ms = elapsed.as_millis() as u64, "step completed");
            events.step_completed(step, elapsed);
        }

        match state {
            FlowState::FirstProductChecked {
                availability,
                first_product,
            } => Ok(FlowReport {
                availability,
                first_product,
            }),
            other => Err(FlowError::Aborted(format!(
                "flow stopped in non-terminal state {other:?}"
            ))),
        }
    }
}


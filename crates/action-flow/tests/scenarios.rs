use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use action_flow::site;
use action_flow::*;
use action_primitives::{ActionError, ActionPrimitives, ActionReport, WaitTier};
use async_trait::async_trait;
use chrono::Utc;
use tokio::time::{sleep, Instant};

/// In-memory page whose visible selectors and listing are fixed per scenario.
#[derive(Default)]
struct ScriptedPage {
    visible: HashSet<String>,
    /// Selector becomes visible on the n-th wait for it (1-based)
    visible_from_wait: HashMap<String, u32>,
    /// Waits on these selectors fail at once with the given error
    broken_waits: HashMap<String, ActionError>,
    cards: Vec<Vec<Option<String>>>,
    anchors: usize,
    control: Option<bool>,
    panic_on_title: bool,
    waits: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedPage {
    fn storefront() -> Self {
        let visible = [
            site::SELECT_LOCATION_BUTTON,
            site::ADDRESS_SEARCH_INPUT,
            site::ADDRESS_SUGGESTION,
            site::LOCATION_CONFIRM_BUTTON,
            site::SEARCH_BAR_ICON,
            site::PRODUCT_SEARCH_INPUT,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        Self {
            visible,
            ..Self::default()
        }
    }

    fn with_cards(mut self, cards: Vec<Vec<Option<String>>>) -> Self {
        self.visible.insert(site::PRODUCT_CARD.to_string());
        self.anchors = cards.len();
        self.cards = cards;
        self
    }

    fn hide(mut self, selector: &str) -> Self {
        self.visible.remove(selector);
        self
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn clicks_on(&self, selector: &str) -> usize {
        let needle = format!("click {selector}");
        self.calls().iter().filter(|c| **c == needle).count()
    }

    fn report(action: &str) -> Result<ActionReport, ActionError> {
        Ok(ActionReport::success(action, Utc::now(), 0))
    }
}

#[async_trait]
impl ActionPrimitives for ScriptedPage {
    async fn navigate(
        &self,
        url: &str,
        _wait_tier: WaitTier,
        _timeout: Duration,
    ) -> Result<ActionReport, ActionError> {
        self.record(format!("navigate {url}"));
        Self::report("navigate")
    }

    async fn page_title(&self) -> Result<String, ActionError> {
        if self.panic_on_title {
            panic!("renderer crashed");
        }
        Ok("Zepto".into())
    }

    async fn wait_for_visible(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ActionReport, ActionError> {
        let attempt = {
            let mut waits = self.waits.lock().unwrap();
            let count = waits.entry(selector.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        self.record(format!("wait {selector}"));
        if let Some(err) = self.broken_waits.get(selector) {
            return Err(err.clone());
        }
        let shows = self.visible.contains(selector)
            || self
                .visible_from_wait
                .get(selector)
                .is_some_and(|from| attempt >= *from);
        if shows {
            return Self::report("wait_visible");
        }
        sleep(timeout).await;
        Err(ActionError::WaitTimeout(format!("'{selector}' not visible")))
    }

    async fn count(&self, selector: &str) -> Result<usize, ActionError> {
        if selector == site::FIRST_PRODUCT_ANCHOR {
            Ok(self.anchors)
        } else {
            Ok(0)
        }
    }

    async fn scroll_into_view(&self, selector: &str) -> Result<ActionReport, ActionError> {
        self.record(format!("scroll {selector}"));
        Self::report("scroll")
    }

    async fn dom_click(&self, selector: &str) -> Result<ActionReport, ActionError> {
        self.record(format!("click {selector}"));
        Self::report("click")
    }

    async fn type_text(
        &self,
        selector: &str,
        text: &str,
        key_delay: Duration,
        _timeout: Duration,
    ) -> Result<ActionReport, ActionError> {
        for _ in text.chars() {
            sleep(key_delay).await;
        }
        self.record(format!("type {selector} {text}"));
        Self::report("type_text")
    }

    async fn press_key(&self, key: &str) -> Result<ActionReport, ActionError> {
        self.record(format!("key {key}"));
        Self::report("press_key")
    }

    async fn wait_for_navigation(
        &self,
        wait_tier: WaitTier,
        _timeout: Duration,
    ) -> Result<ActionReport, ActionError> {
        self.record(format!("wait-nav {wait_tier:?}"));
        Self::report("wait_for_navigation")
    }

    async fn reload(
        &self,
        wait_tier: WaitTier,
        _timeout: Duration,
    ) -> Result<ActionReport, ActionError> {
        self.record(format!("reload {wait_tier:?}"));
        Self::report("reload")
    }

    async fn text_fields(
        &self,
        _container: &str,
        _fields: &[&str],
    ) -> Result<Vec<Vec<Option<String>>>, ActionError> {
        Ok(self.cards.clone())
    }

    async fn interactable(&self, _selector: &str) -> Result<Option<bool>, ActionError> {
        Ok(self.control)
    }
}

struct FakeSession {
    page: ScriptedPage,
    releases: Arc<AtomicU32>,
}

#[async_trait]
impl Session for FakeSession {
    fn primitives(&self) -> &dyn ActionPrimitives {
        &self.page
    }

    async fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingEvents {
    availability: Mutex<Vec<AvailabilityOutcome>>,
    first_product: Mutex<Vec<FirstProductCheck>>,
    steps: Mutex<Vec<FlowStep>>,
}

impl FlowEvents for RecordingEvents {
    fn step_completed(&self, step: FlowStep, _elapsed: Duration) {
        self.steps.lock().unwrap().push(step);
    }

    fn availability_determined(&self, _product: &str, outcome: &AvailabilityOutcome) {
        self.availability.lock().unwrap().push(outcome.clone());
    }

    fn first_product_checked(&self, _product: &str, check: &FirstProductCheck) {
        self.first_product.lock().unwrap().push(*check);
    }
}

fn card(name: &str, price: &str, quantity: &str) -> Vec<Option<String>> {
    vec![Some(name.into()), Some(price.into()), Some(quantity.into())]
}

fn springfield_milk() -> ProbeFlow {
    ProbeFlow::new(RunConfig::new("Springfield", "milk").with_timeout_ms(60_000))
        .expect("valid config")
}

async fn run(
    page: ScriptedPage,
    events: &RecordingEvents,
) -> (Result<FlowReport, FlowError>, SessionHandle<FakeSession>, u32) {
    let releases = Arc::new(AtomicU32::new(0));
    let handle = SessionHandle::new(FakeSession {
        page,
        releases: releases.clone(),
    });
    let flow = springfield_milk();
    let result = run_in_session(&handle, flow.execute(handle.primitives(), events)).await;
    let released = releases.load(Ordering::SeqCst);
    (result, handle, released)
}

#[tokio::test(start_paused = true)]
async fn listing_with_three_cards_is_available() {
    let page = ScriptedPage::storefront().with_cards(vec![
        card("Amul Taaza Milk", "₹28", "500 ml"),
        card("Mother Dairy Milk", "₹33", "500 ml"),
        card("Nandini Milk", "₹24", "500 ml"),
    ]);
    let page = ScriptedPage {
        control: Some(true),
        ..page
    };
    let events = RecordingEvents::default();

    let (result, handle, released) = run(page, &events).await;
    let report = result.expect("flow completes");

    match &report.availability {
        AvailabilityOutcome::Available(records) => {
            assert_eq!(records.len(), 3);
            assert!(records.iter().all(|r| r.name != NOT_AVAILABLE
                && r.price != NOT_AVAILABLE
                && r.quantity != NOT_AVAILABLE));
            assert_eq!(records[0].name, "Amul Taaza Milk");
        }
        other => panic!("expected available listing, got {other:?}"),
    }
    assert_eq!(
        report.first_product,
        FirstProductCheck::Available {
            added_to_cart: true
        }
    );
    assert_eq!(released, 1);
    assert!(handle.is_released());
    assert_eq!(*events.steps.lock().unwrap(), FlowStep::ALL.to_vec());

    let page = &handle.session().page;
    let calls = page.calls();
    assert_eq!(calls[0], format!("navigate {}", site::DEFAULT_SITE_URL));
    assert!(calls.contains(&format!("type {} Springfield", site::ADDRESS_SEARCH_INPUT)));
    assert!(calls.contains(&format!("type {} milk", site::PRODUCT_SEARCH_INPUT)));
    assert!(calls.contains(&"key Enter".to_string()));
    assert!(calls.contains(&"wait-nav Idle".to_string()));
    let tail: Vec<&String> = calls.iter().rev().take(4).collect();
    assert_eq!(
        tail,
        [
            &format!("click {}", site::INCREASE_QUANTITY_BUTTON),
            &"reload DomReady".to_string(),
            &"wait-nav Load".to_string(),
            &format!("click {}", site::FIRST_PRODUCT_ANCHOR),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn missing_results_are_unavailable_not_fatal() {
    let page = ScriptedPage::storefront();
    let events = RecordingEvents::default();
    let started = Instant::now();

    let (result, handle, released) = run(page, &events).await;
    let report = result.expect("absence is an outcome");

    assert_eq!(report.availability, AvailabilityOutcome::Unavailable);
    assert_eq!(report.first_product, FirstProductCheck::NotFound);
    assert_eq!(released, 1);
    assert!(started.elapsed() >= Duration::from_millis(15_000));
    assert!(started.elapsed() < Duration::from_millis(60_000));
    assert_eq!(
        *events.availability.lock().unwrap(),
        vec![AvailabilityOutcome::Unavailable]
    );
    assert_eq!(handle.session().page.clicks_on(site::FIRST_PRODUCT_ANCHOR), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_location_control_is_fatal_and_still_released() {
    let page = ScriptedPage::storefront().hide(site::SELECT_LOCATION_BUTTON);
    let events = RecordingEvents::default();

    let (result, handle, released) = run(page, &events).await;
    let err = result.expect_err("location control never appears");

    match &err {
        FlowError::StepFailed {
            step,
            selector,
            source,
        } => {
            assert_eq!(*step, FlowStep::OpenLocationPrompt);
            assert_eq!(selector.as_deref(), Some(site::SELECT_LOCATION_BUTTON));
            assert_eq!(
                *source,
                ActionError::ActionFailed {
                    selector: site::SELECT_LOCATION_BUTTON.to_string(),
                    attempts: 3,
                }
            );
        }
        other => panic!("expected step failure, got {other:?}"),
    }
    assert_eq!(released, 1);
    assert!(!handle.release().await, "second release is a no-op");
    assert_eq!(handle.session().releases.load(Ordering::SeqCst), 1);

    let page = &handle.session().page;
    assert_eq!(page.clicks_on(site::SELECT_LOCATION_BUTTON), 0);
    assert!(!page
        .calls()
        .iter()
        .any(|c| c.contains(site::ADDRESS_SEARCH_INPUT)));
    assert!(events.availability.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn broken_results_wait_is_fatal_not_unavailable() {
    let mut page = ScriptedPage::storefront();
    page.broken_waits.insert(
        site::PRODUCT_CARD.to_string(),
        ActionError::CdpIo("websocket closed".into()),
    );
    let events = RecordingEvents::default();

    let (result, handle, released) = run(page, &events).await;
    let err = result.expect_err("transport failure is not absence");

    match &err {
        FlowError::StepFailed {
            step,
            selector,
            source,
        } => {
            assert_eq!(*step, FlowStep::AwaitResults);
            assert_eq!(selector.as_deref(), Some(site::PRODUCT_CARD));
            assert_eq!(*source, ActionError::CdpIo("websocket closed".into()));
        }
        other => panic!("expected step failure, got {other:?}"),
    }
    assert!(events.availability.lock().unwrap().is_empty());
    assert!(events.first_product.lock().unwrap().is_empty());
    assert_eq!(released, 1);
    assert!(handle.is_released());
}

#[tokio::test(start_paused = true)]
async fn disabled_quantity_control_reports_both_outcomes() {
    let page = ScriptedPage::storefront().with_cards(vec![card("Amul Milk", "₹28", "500 ml")]);
    let page = ScriptedPage {
        control: Some(false),
        ..page
    };
    let events = RecordingEvents::default();

    let (result, handle, _) = run(page, &events).await;
    let report = result.expect("flow completes");

    assert!(report.availability.is_available());
    assert_eq!(
        report.first_product,
        FirstProductCheck::Unavailable {
            reason: UnavailableReason::ControlDisabled
        }
    );
    assert_eq!(handle.session().page.clicks_on(site::INCREASE_QUANTITY_BUTTON), 0);
    assert_eq!(events.first_product.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn absent_quantity_control_is_unavailable() {
    let page = ScriptedPage::storefront().with_cards(vec![card("Amul Milk", "₹28", "500 ml")]);
    let events = RecordingEvents::default();

    let (result, _, _) = run(page, &events).await;
    assert_eq!(
        result.expect("flow completes").first_product,
        FirstProductCheck::Unavailable {
            reason: UnavailableReason::ControlMissing
        }
    );
}

#[tokio::test(start_paused = true)]
async fn card_without_price_keeps_name_and_quantity() {
    let page = ScriptedPage::storefront().with_cards(vec![vec![
        Some("Amul Milk".into()),
        None,
        Some("500 ml".into()),
    ]]);
    let events = RecordingEvents::default();

    let (result, _, _) = run(page, &events).await;
    let report = result.expect("flow completes");
    assert_eq!(
        report.availability,
        AvailabilityOutcome::Available(vec![ProductRecord {
            name: "Amul Milk".into(),
            price: NOT_AVAILABLE.into(),
            quantity: "500 ml".into(),
        }])
    );
}

#[tokio::test(start_paused = true)]
async fn late_suggestion_is_clicked_exactly_once() {
    let mut page = ScriptedPage::storefront().hide(site::ADDRESS_SUGGESTION);
    page.visible_from_wait
        .insert(site::ADDRESS_SUGGESTION.to_string(), 2);
    let events = RecordingEvents::default();

    let (result, handle, _) = run(page, &events).await;
    result.expect("second attempt finds the suggestion");
    assert_eq!(handle.session().page.clicks_on(site::ADDRESS_SUGGESTION), 1);
}

#[tokio::test(start_paused = true)]
async fn extraction_is_idempotent_on_unchanged_page() {
    let page = ScriptedPage::storefront().with_cards(vec![
        card("A", "₹1", "1 pc"),
        vec![None, None, None],
    ]);
    let extractor = AvailabilityExtractor::new();
    let first = extractor.extract(&page).await.unwrap();
    let second = extractor.extract(&page).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first[1].name, NOT_AVAILABLE);

    let empty = ScriptedPage::storefront();
    assert!(extractor.extract(&empty).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn panicking_flow_is_aborted_and_released_once() {
    let page = ScriptedPage {
        panic_on_title: true,
        ..ScriptedPage::storefront()
    };
    let events = RecordingEvents::default();

    let (result, handle, released) = run(page, &events).await;
    match result {
        Err(FlowError::Aborted(message)) => assert!(message.contains("renderer crashed")),
        other => panic!("expected abort, got {other:?}"),
    }
    assert_eq!(released, 1);
    assert!(handle.is_released());
}

#[test]
fn blank_city_is_rejected_before_any_browser_work() {
    let err = ProbeFlow::new(RunConfig::new("", "milk")).expect_err("blank city");
    assert!(matches!(err, FlowError::InvalidConfig(_)));
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio::{select, spawn};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::{NavigationMark, WaitGate};
use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::events::RawEvent;
use crate::ids::{BrowserId, PageId, SessionId};
use crate::metrics;
use crate::network::{NetworkTracker, TapEvent};
use crate::registry::Registry;
use crate::transport::{CdpTransport, ChromiumTransport, CommandTarget, TransportEvent};

/// Shared event bus type alias used by the adapter.
pub type EventBus = broadcast::Sender<RawEvent>;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const ATTACH_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

/// CDP capability surface required by the action layer.
#[async_trait]
pub trait Cdp: Send + Sync {
    /// Navigate the page and wait until `gate` is reached for the new document.
    async fn navigate(
        &self,
        page: PageId,
        url: &str,
        gate: WaitGate,
        timeout: Duration,
    ) -> Result<(), AdapterError>;
    async fn reload(&self, page: PageId, gate: WaitGate, timeout: Duration)
        -> Result<(), AdapterError>;
    fn navigation_mark(&self, page: PageId) -> NavigationMark;
    /// Wait for a main-frame navigation committed after `since` to reach `gate`.
    async fn wait_for_navigation(
        &self,
        page: PageId,
        since: NavigationMark,
        gate: WaitGate,
        timeout: Duration,
    ) -> Result<(), AdapterError>;
    async fn wait_for_selector(
        &self,
        page: PageId,
        selector: &str,
        visible: bool,
        timeout: Duration,
    ) -> Result<(), AdapterError>;
    async fn query_count(&self, page: PageId, selector: &str) -> Result<usize, AdapterError>;
    async fn scroll_into_view(&self, page: PageId, selector: &str) -> Result<(), AdapterError>;
    /// Invoke the DOM `click()` of the first element matching `selector`.
    async fn dom_click(&self, page: PageId, selector: &str) -> Result<(), AdapterError>;
    async fn type_text(
        &self,
        page: PageId,
        selector: &str,
        text: &str,
        key_delay: Duration,
        timeout: Duration,
    ) -> Result<(), AdapterError>;
    async fn press_key(&self, page: PageId, key: &str) -> Result<(), AdapterError>;
    async fn evaluate_script(&self, page: PageId, expression: &str)
        -> Result<Value, AdapterError>;
    async fn page_title(&self, page: PageId) -> Result<String, AdapterError>;
    async fn set_user_agent(
        &self,
        page: PageId,
        user_agent: &str,
        accept_language: Option<&str>,
        platform: Option<&str>,
        locale: Option<&str>,
    ) -> Result<(), AdapterError>;
    async fn set_timezone(&self, page: PageId, timezone: &str) -> Result<(), AdapterError>;
    async fn set_device_metrics(
        &self,
        page: PageId,
        width: u32,
        height: u32,
        device_scale_factor: f64,
        mobile: bool,
    ) -> Result<(), AdapterError>;
    async fn set_touch_emulation(&self, page: PageId, enabled: bool) -> Result<(), AdapterError>;
    /// Register a script evaluated in every new document before page scripts run.
    async fn add_init_script(&self, page: PageId, source: &str) -> Result<(), AdapterError>;
}

/// Adapter implementation with pluggable transport.
pub struct CdpAdapter {
    pub browser_id: BrowserId,
    pub cfg: CdpConfig,
    pub bus: EventBus,
    pub registry: Arc<Registry>,
    shutdown: CancellationToken,
    closed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    transport: Arc<dyn CdpTransport>,
    targets: DashMap<String, PageId>,
    sessions: DashMap<String, PageId>,
    network: NetworkTracker,
}

impl CdpAdapter {
    pub fn new(cfg: CdpConfig, bus: EventBus) -> Self {
        match &cfg.websocket_url {
            Some(url) => info!(target: "cdp-adapter", %url, "attaching to running chromium"),
            None => info!(
                target: "cdp-adapter",
                executable = %cfg.executable.display(),
                headless = cfg.headless,
                "launching chromium"
            ),
        }
        let transport: Arc<dyn CdpTransport> = Arc::new(ChromiumTransport::new(cfg.clone()));
        Self::with_transport(cfg, bus, transport)
    }

    pub fn with_transport(
        cfg: CdpConfig,
        bus: EventBus,
        transport: Arc<dyn CdpTransport>,
    ) -> Self {
        Self {
            browser_id: BrowserId::new(),
            cfg,
            bus,
            registry: Arc::new(Registry::new()),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            transport,
            targets: DashMap::new(),
            sessions: DashMap::new(),
            network: NetworkTracker::new(),
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RawEvent> {
        self.bus.subscribe()
    }

    pub async fn start(self: Arc<Self>) -> Result<(), AdapterError> {
        {
            let guard = self.tasks.lock().await;
            if !guard.is_empty() {
                return Ok(());
            }
        }

        self.transport.start().await?;
        let loop_task = spawn(Self::event_loop(Arc::clone(&self)));
        self.tasks.lock().await.push(loop_task);
        info!(target: "cdp-adapter", browser = %self.browser_id.0, "event loop started");
        Ok(())
    }

    /// Stop the event loop. The browser itself stays up; see [`CdpAdapter::close_browser`].
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut handles = self.tasks.lock().await;
        while let Some(handle) = handles.pop() {
            let _ = handle.await;
        }
    }

    /// Close the browser and release the transport. Safe to call more than once.
    pub async fn close_browser(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        match timeout(CLOSE_TIMEOUT, self.send_command("Browser.close", json!({}))).await {
            Ok(Ok(_)) => debug!(target: "cdp-adapter", "Browser.close acknowledged"),
            Ok(Err(err)) => debug!(target: "cdp-adapter", ?err, "Browser.close failed"),
            Err(_) => debug!(target: "cdp-adapter", "Browser.close timed out"),
        }
        self.shutdown().await;
        self.transport.shutdown().await;
        self.registry.clear();
        self.network.clear();
        info!(target: "cdp-adapter", browser = %self.browser_id.0, "browser closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn register_page(
        &self,
        page: PageId,
        session: SessionId,
        target_id: Option<String>,
        cdp_session: Option<String>,
    ) {
        if let Some(target) = target_id.as_ref() {
            self.targets.insert(target.clone(), page);
        }
        if let Some(cdp) = cdp_session.as_ref() {
            self.sessions.insert(cdp.clone(), page);
        }
        self.registry
            .insert_page(page, session, target_id, cdp_session);
    }

    /// Open a new page target and enable the domains the adapter relies on.
    pub async fn create_page(&self, url: &str) -> Result<PageId, AdapterError> {
        let response = self
            .send_command("Target.createTarget", json!({ "url": url }))
            .await?;
        let target_id = response
            .get("targetId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint("createTarget missing targetId")
            })?
            .to_string();

        let deadline = Instant::now() + ATTACH_TIMEOUT;
        let page = loop {
            if let Some(page) = self.targets.get(&target_id).map(|entry| *entry.value()) {
                if self.registry.get_cdp_session(&page).is_some() {
                    break page;
                }
            }

            if Instant::now() >= deadline {
                return Err(AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint("timed out waiting for target attach"));
            }

            sleep(Duration::from_millis(50)).await;
        };

        self.prepare_page(page).await?;
        debug!(target: "cdp-adapter", %target_id, "page attached");
        Ok(page)
    }

    async fn prepare_page(&self, page: PageId) -> Result<(), AdapterError> {
        self.send_page_command(page, "Page.enable", json!({}))
            .await?;
        self.send_page_command(page, "Page.setLifecycleEventsEnabled", json!({ "enabled": true }))
            .await?;
        self.send_page_command(page, "Network.enable", json!({}))
            .await?;
        self.send_page_command(page, "Runtime.enable", json!({}))
            .await?;
        Ok(())
    }

    async fn event_loop(self: Arc<Self>) {
        debug!(target: "cdp-adapter", "event loop entered");
        loop {
            select! {
                _ = self.shutdown.cancelled() => {
                    break;
                }
                event = self.transport.next_event() => {
                    match event {
                        Some(ev) => self.handle_event(ev),
                        None => {
                            if !self.shutdown.is_cancelled() {
                                warn!(target: "cdp-adapter", "transport stream ended");
                                self.handle_transport_disconnect();
                            }
                            break;
                        }
                    }
                }
            }
        }
        debug!(target: "cdp-adapter", "event loop exiting");
    }

    fn handle_transport_disconnect(&self) {
        for page in self.registry.pages() {
            self.emit_page_event(page, "closed", timestamp_now());
        }
        self.registry.clear();
        self.targets.clear();
        self.sessions.clear();
        self.network.clear();

        let _ = self.bus.send(RawEvent::Error {
            page: None,
            message: "cdp transport disconnected; active pages were reset".to_string(),
        });
    }

    fn handle_event(&self, event: TransportEvent) {
        if let Err(err) = self.process_event(event) {
            let _ = self.bus.send(RawEvent::Error {
                page: None,
                message: format!("cdp event handling error: {err}"),
            });
        }
    }

    fn process_event(&self, event: TransportEvent) -> Result<(), AdapterError> {
        metrics::record_event();
        match event.method.as_str() {
            "Target.targetCreated" => self.on_target_created(event.params),
            "Target.targetDestroyed" => self.on_target_destroyed(event.params),
            "Target.attachedToTarget" => self.on_target_attached(event.params),
            "Target.detachedFromTarget" => self.on_target_detached(event.params),
            "Target.targetInfoChanged" => self.on_target_info_changed(event.params),
            "Page.frameNavigated" => self.on_frame_navigated(event),
            "Page.navigatedWithinDocument" => self.on_navigated_within_document(event),
            "Page.lifecycleEvent" => self.on_page_lifecycle(event),
            "Page.domContentEventFired" => {
                self.on_page_milestone(event.session_id.as_ref(), "DOMContentLoaded");
                Ok(())
            }
            "Page.loadEventFired" => {
                self.on_page_milestone(event.session_id.as_ref(), "load");
                Ok(())
            }
            "Network.requestWillBeSent"
            | "Network.responseReceived"
            | "Network.loadingFinished"
            | "Network.loadingFailed" => self.on_network_event(event),
            "Runtime.exceptionThrown" => self.on_exception_thrown(event),
            _ => {
                debug!(target: "cdp-adapter", method = %event.method, "unhandled cdp event");
                Ok(())
            }
        }
    }

    fn on_target_created(&self, params: Value) -> Result<(), AdapterError> {
        let payload: TargetCreatedParams = decode(params)?;
        if payload.target_info.target_type != "page" {
            return Ok(());
        }

        let target_id = payload.target_info.target_id;
        if self.targets.contains_key(&target_id) {
            return Ok(());
        }
        let page = PageId::new();
        self.targets.insert(target_id.clone(), page);
        self.registry
            .insert_page(page, SessionId::new(), Some(target_id), None);
        if let Some(url) = payload.target_info.url.filter(|u| !u.is_empty()) {
            self.registry.set_recent_url(&page, url);
        }
        self.emit_page_event(page, "opened", timestamp_now());
        Ok(())
    }

    fn on_target_destroyed(&self, params: Value) -> Result<(), AdapterError> {
        let payload: TargetDestroyedParams = decode(params)?;
        if let Some((_, page)) = self.targets.remove(&payload.target_id) {
            self.sessions.retain(|_, v| *v != page);
            self.registry.remove_page(&page);
            self.network.remove(&page);
            self.emit_page_event(page, "closed", timestamp_now());
        }
        Ok(())
    }

    fn on_target_attached(&self, params: Value) -> Result<(), AdapterError> {
        let payload: AttachedToTargetParams = decode(params)?;
        if payload.target_info.target_type != "page" {
            return Ok(());
        }

        if let Some(page) = self
            .targets
            .get(&payload.target_info.target_id)
            .map(|entry| *entry.value())
        {
            self.sessions.insert(payload.session_id.clone(), page);
            self.registry.set_cdp_session(&page, payload.session_id);
            self.emit_page_event(page, "attached", timestamp_now());
        }
        Ok(())
    }

    fn on_target_detached(&self, params: Value) -> Result<(), AdapterError> {
        let payload: DetachedFromTargetParams = decode(params)?;
        self.sessions.remove(&payload.session_id);
        Ok(())
    }

    fn on_target_info_changed(&self, params: Value) -> Result<(), AdapterError> {
        let payload: TargetInfoChangedParams = decode(params)?;
        if payload.target_info.target_type != "page" {
            return Ok(());
        }
        if let Some(page) = self
            .targets
            .get(&payload.target_info.target_id)
            .map(|entry| *entry.value())
        {
            if let Some(url) = payload.target_info.url.filter(|u| !u.is_empty()) {
                self.registry.set_recent_url(&page, url);
            }
        }
        Ok(())
    }

    fn on_frame_navigated(&self, event: TransportEvent) -> Result<(), AdapterError> {
        let payload: FrameNavigatedParams = decode(event.params)?;
        if payload.frame.parent_id.is_some() {
            return Ok(());
        }
        if let Some(page) = self.page_from_session(event.session_id.as_ref()) {
            self.registry.update_navigation(&page, |nav| nav.begin(false));
            self.network.reset(page);
            if let Some(url) = payload.frame.url.clone() {
                self.registry.set_recent_url(&page, url.clone());
                let _ = self.bus.send(RawEvent::PageNavigated {
                    page,
                    url,
                    same_document: false,
                    ts: timestamp_now(),
                });
            }
        }
        Ok(())
    }

    fn on_navigated_within_document(&self, event: TransportEvent) -> Result<(), AdapterError> {
        let payload: NavigatedWithinDocumentParams = decode(event.params)?;
        if let Some(page) = self.page_from_session(event.session_id.as_ref()) {
            if !self.registry.is_main_frame(&page, &payload.frame_id) {
                return Ok(());
            }
            self.registry.update_navigation(&page, |nav| nav.begin(true));
            self.registry.set_recent_url(&page, payload.url.clone());
            let _ = self.bus.send(RawEvent::PageNavigated {
                page,
                url: payload.url,
                same_document: true,
                ts: timestamp_now(),
            });
        }
        Ok(())
    }

    fn on_page_lifecycle(&self, event: TransportEvent) -> Result<(), AdapterError> {
        let payload: PageLifecycleParams = decode(event.params)?;
        let Some(page) = self.page_from_session(event.session_id.as_ref()) else {
            return Ok(());
        };
        let is_main = payload
            .frame_id
            .as_deref()
            .map(|frame| self.registry.is_main_frame(&page, frame))
            .unwrap_or(true);
        if is_main {
            self.on_page_milestone(event.session_id.as_ref(), &payload.name);
        }
        Ok(())
    }

    fn on_page_milestone(&self, session: Option<&String>, name: &str) {
        let Some(page) = self.page_from_session(session) else {
            return;
        };
        match name {
            "DOMContentLoaded" => {
                self.registry.update_navigation(&page, |nav| nav.dom_ready = true);
            }
            "load" => {
                self.registry.update_navigation(&page, |nav| {
                    nav.dom_ready = true;
                    nav.loaded = true;
                });
            }
            _ => return,
        }
        self.emit_page_event(page, &name.to_ascii_lowercase(), timestamp_now());
    }

    fn on_network_event(&self, event: TransportEvent) -> Result<(), AdapterError> {
        let Some(page) = self.page_from_session(event.session_id.as_ref()) else {
            return Ok(());
        };
        let payload: NetworkEventParams = decode(event.params)?;
        let request_id = payload.request_id;
        let tap = match event.method.as_str() {
            "Network.requestWillBeSent" => TapEvent::RequestWillBeSent { request_id },
            "Network.responseReceived" => TapEvent::ResponseReceived {
                request_id,
                status: payload.response.map(|r| r.status).unwrap_or_default(),
            },
            "Network.loadingFinished" => TapEvent::LoadingFinished { request_id },
            _ => TapEvent::LoadingFailed { request_id },
        };
        self.network.ingest(page, tap);
        Ok(())
    }

    fn on_exception_thrown(&self, event: TransportEvent) -> Result<(), AdapterError> {
        let payload: ExceptionThrownParams = decode(event.params)?;
        let message = payload
            .exception_details
            .exception
            .and_then(|ex| ex.description)
            .or(payload.exception_details.text)
            .unwrap_or_else(|| "runtime exception".to_string());
        let page = self.page_from_session(event.session_id.as_ref());
        debug!(target: "cdp-adapter", %message, "page script exception");
        let _ = self.bus.send(RawEvent::Error { page, message });
        Ok(())
    }

    fn page_from_session(&self, session: Option<&String>) -> Option<PageId> {
        session.and_then(|sid| self.sessions.get(sid).map(|entry| *entry.value()))
    }

    fn emit_page_event(&self, page: PageId, phase: &str, ts: u64) {
        let _ = self.bus.send(RawEvent::PageLifecycle {
            page,
            phase: phase.to_string(),
            ts,
        });
    }

    async fn ready_state(&self, page: PageId) -> Option<String> {
        let response = self
            .send_page_command(
                page,
                "Runtime.evaluate",
                json!({
                    "expression": "document.readyState",
                    "returnByValue": true,
                }),
            )
            .await
            .ok()?;
        response
            .get("result")
            .and_then(|v| v.get("value"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    async fn gate_reached(&self, page: PageId, gate: WaitGate) -> bool {
        let Some(nav) = self.registry.navigation(&page) else {
            return false;
        };
        match gate {
            WaitGate::DomReady => {
                nav.dom_ready
                    || matches!(
                        self.ready_state(page).await.as_deref(),
                        Some("interactive" | "complete")
                    )
            }
            WaitGate::Load => {
                nav.loaded || matches!(self.ready_state(page).await.as_deref(), Some("complete"))
            }
            WaitGate::NetworkQuiet {
                window_ms,
                max_inflight,
            } => {
                if !nav.dom_ready {
                    return false;
                }
                let snapshot = self.network.snapshot(page);
                let quiet = snapshot.is_quiet(window_ms, max_inflight);
                if quiet {
                    let _ = self.bus.send(RawEvent::NetworkIdle {
                        page,
                        inflight: snapshot.inflight,
                        since_last_activity_ms: snapshot.since_last_activity_ms,
                    });
                }
                quiet
            }
        }
    }

    async fn wait_for_gate(
        &self,
        page: PageId,
        since: NavigationMark,
        gate: WaitGate,
        deadline: Instant,
        budget: Duration,
    ) -> Result<(), AdapterError> {
        loop {
            let nav = self.registry.navigation(&page).ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::TargetNotFound)
                    .with_hint(format!("page {page:?} closed while waiting for navigation"))
            })?;

            if nav.navigated_since(since) && self.gate_reached(page, gate).await {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                    .with_hint(format!(
                        "navigation did not reach {gate:?} within {}ms",
                        budget.as_millis()
                    ))
                    .retriable(true));
            }

            sleep(POLL_INTERVAL).await;
        }
    }

    async fn send_command(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        let start = Instant::now();
        metrics::record_command(method);
        match self
            .transport
            .send_command(CommandTarget::Browser, method, params)
            .await
        {
            Ok(value) => {
                metrics::record_command_success(start.elapsed());
                Ok(value)
            }
            Err(err) => {
                metrics::record_command_failure(method);
                Err(err)
            }
        }
    }

    async fn send_page_command(
        &self,
        page: PageId,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let session = self.registry.get_cdp_session(&page).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint(format!("missing cdp session for page {page:?}"))
        })?;
        let start = Instant::now();
        metrics::record_command(method);
        match self
            .transport
            .send_command(CommandTarget::Session(session), method, params)
            .await
        {
            Ok(value) => {
                metrics::record_command_success(start.elapsed());
                Ok(value)
            }
            Err(err) => {
                metrics::record_command_failure(method);
                Err(err)
            }
        }
    }

    async fn dispatch_key(&self, page: PageId, key: &KeyDefinition) -> Result<(), AdapterError> {
        let down_type = if key.text.is_some() {
            "keyDown"
        } else {
            "rawKeyDown"
        };
        let mut down = json!({
            "type": down_type,
            "key": key.key,
            "code": key.code,
            "windowsVirtualKeyCode": key.key_code,
        });
        if let Some(text) = key.text.as_deref() {
            down["text"] = json!(text);
            down["unmodifiedText"] = json!(text);
        }
        self.send_page_command(page, "Input.dispatchKeyEvent", down)
            .await?;
        self.send_page_command(
            page,
            "Input.dispatchKeyEvent",
            json!({
                "type": "keyUp",
                "key": key.key,
                "code": key.code,
                "windowsVirtualKeyCode": key.key_code,
            }),
        )
        .await?;
        Ok(())
    }

    async fn evaluate_selector_flag(
        &self,
        page: PageId,
        expression: String,
        selector: &str,
        action: &str,
    ) -> Result<(), AdapterError> {
        let found = self
            .evaluate_script(page, &expression)
            .await?
            .as_bool()
            .unwrap_or(false);
        if found {
            Ok(())
        } else {
            Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
                .with_hint(format!("{action}: no element matches '{selector}'")))
        }
    }
}

struct KeyDefinition {
    key: String,
    code: String,
    key_code: u32,
    text: Option<String>,
}

impl KeyDefinition {
    fn named(key: &str) -> Option<Self> {
        let (code, key_code, text) = match key {
            "Enter" => ("Enter", 13, Some("\r")),
            "Tab" => ("Tab", 9, None),
            "Escape" => ("Escape", 27, None),
            "Backspace" => ("Backspace", 8, None),
            _ => return None,
        };
        Some(Self {
            key: key.to_string(),
            code: code.to_string(),
            key_code,
            text: text.map(str::to_string),
        })
    }

    fn printable(ch: char) -> Option<Self> {
        if !(ch.is_ascii_graphic() || ch == ' ') {
            return None;
        }
        let key_code = ch.to_ascii_uppercase() as u32;
        let code = match ch {
            'a'..='z' | 'A'..='Z' => format!("Key{}", ch.to_ascii_uppercase()),
            '0'..='9' => format!("Digit{ch}"),
            ' ' => "Space".to_string(),
            _ => String::new(),
        };
        Some(Self {
            key: ch.to_string(),
            code,
            key_code,
            text: Some(ch.to_string()),
        })
    }
}

fn selector_literal(selector: &str) -> Result<String, AdapterError> {
    serde_json::to_string(selector)
        .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))
}

fn decode<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T, AdapterError> {
    serde_json::from_value(params)
        .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))
}

fn timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_millis() as u64
}

#[async_trait]
impl Cdp for CdpAdapter {
    async fn navigate(
        &self,
        page: PageId,
        url: &str,
        gate: WaitGate,
        timeout: Duration,
    ) -> Result<(), AdapterError> {
        let deadline = Instant::now() + timeout;
        let mark = self.navigation_mark(page);
        let response = self
            .send_page_command(page, "Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error_text) = response
            .get("errorText")
            .and_then(|v| v.as_str())
            .filter(|text| !text.is_empty())
        {
            return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("navigation to {url} failed: {error_text}")));
        }
        self.registry.set_recent_url(&page, url.to_string());
        self.wait_for_gate(page, mark, gate, deadline, timeout)
            .await
    }

    async fn reload(
        &self,
        page: PageId,
        gate: WaitGate,
        timeout: Duration,
    ) -> Result<(), AdapterError> {
        let deadline = Instant::now() + timeout;
        let mark = self.navigation_mark(page);
        self.send_page_command(page, "Page.reload", json!({}))
            .await?;
        self.wait_for_gate(page, mark, gate, deadline, timeout)
            .await
    }

    fn navigation_mark(&self, page: PageId) -> NavigationMark {
        self.registry
            .navigation(&page)
            .map(|nav| nav.mark())
            .unwrap_or_default()
    }

    async fn wait_for_navigation(
        &self,
        page: PageId,
        since: NavigationMark,
        gate: WaitGate,
        timeout: Duration,
    ) -> Result<(), AdapterError> {
        let deadline = Instant::now() + timeout;
        self.wait_for_gate(page, since, gate, deadline, timeout)
            .await
    }

    async fn wait_for_selector(
        &self,
        page: PageId,
        selector: &str,
        visible: bool,
        timeout: Duration,
    ) -> Result<(), AdapterError> {
        let literal = selector_literal(selector)?;
        let expression = format!(
            "(() => {{\n    let el;\n    try {{ el = document.querySelector({literal}); }} catch (err) {{ return 'invalid'; }}\n    if (!el) {{ return 'missing'; }}\n    if (!{visible}) {{ return 'present'; }}\n    const style = window.getComputedStyle(el);\n    const rect = el.getBoundingClientRect();\n    const shown = style && style.visibility !== 'hidden' && rect.width > 0 && rect.height > 0;\n    return shown ? 'visible' : 'hidden';\n}})()"
        );

        let deadline = Instant::now() + timeout;
        let mut last_state = String::from("missing");
        loop {
            match self.evaluate_script(page, &expression).await {
                Ok(value) => {
                    let state = value.as_str().unwrap_or("missing");
                    match state {
                        "visible" | "present" => return Ok(()),
                        "invalid" => {
                            return Err(AdapterError::new(AdapterErrorKind::Internal)
                                .with_hint(format!("invalid selector '{selector}'")))
                        }
                        other => last_state = other.to_string(),
                    }
                }
                Err(err) => {
                    if self.registry.get(&page).is_none() {
                        return Err(err);
                    }
                    // execution context churn while the page navigates
                    debug!(target: "cdp-adapter", ?err, selector, "selector probe failed");
                    last_state = err.to_string();
                }
            }

            if Instant::now() >= deadline {
                return Err(AdapterError::new(AdapterErrorKind::WaitTimeout)
                    .with_hint(format!(
                        "selector '{selector}' not {} within {}ms",
                        if visible { "visible" } else { "present" },
                        timeout.as_millis()
                    ))
                    .with_data(json!({ "lastState": last_state }))
                    .retriable(true));
            }

            sleep(POLL_INTERVAL).await;
        }
    }

    async fn query_count(&self, page: PageId, selector: &str) -> Result<usize, AdapterError> {
        let literal = selector_literal(selector)?;
        let value = self
            .evaluate_script(
                page,
                &format!("document.querySelectorAll({literal}).length"),
            )
            .await?;
        value.as_u64().map(|count| count as usize).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint("query count did not return a number")
        })
    }

    async fn scroll_into_view(&self, page: PageId, selector: &str) -> Result<(), AdapterError> {
        let literal = selector_literal(selector)?;
        let expression = format!(
            "(() => {{\n    const el = document.querySelector({literal});\n    if (!el) {{ return false; }}\n    el.scrollIntoView({{ block: 'center', inline: 'center' }});\n    return true;\n}})()"
        );
        self.evaluate_selector_flag(page, expression, selector, "scroll_into_view")
            .await
    }

    async fn dom_click(&self, page: PageId, selector: &str) -> Result<(), AdapterError> {
        let literal = selector_literal(selector)?;
        let expression = format!(
            "(() => {{\n    const el = document.querySelector({literal});\n    if (!el) {{ return false; }}\n    el.click();\n    return true;\n}})()"
        );
        self.evaluate_selector_flag(page, expression, selector, "dom_click")
            .await
    }

    async fn type_text(
        &self,
        page: PageId,
        selector: &str,
        text: &str,
        key_delay: Duration,
        timeout: Duration,
    ) -> Result<(), AdapterError> {
        let literal = selector_literal(selector)?;
        let focus_expression = format!(
            "(() => {{\n    const el = document.querySelector({literal});\n    if (!el) {{ return {{ status: 'not-found' }}; }}\n    if (typeof el.focus === 'function') {{ el.focus(); }}\n    return {{ status: 'focused' }};\n}})()"
        );

        let focus_deadline = Instant::now() + timeout;
        loop {
            let response = self.evaluate_script(page, &focus_expression).await?;
            let status = response
                .get("status")
                .and_then(|val| val.as_str())
                .unwrap_or("unknown");

            match status {
                "focused" => break,
                "not-found" => {
                    if Instant::now() >= focus_deadline {
                        return Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
                            .with_hint(format!("selector '{selector}' not found before deadline")));
                    }
                    sleep(POLL_INTERVAL).await;
                }
                other => {
                    return Err(AdapterError::new(AdapterErrorKind::Internal).with_hint(format!(
                        "failed to focus element for selector '{selector}' (status: {other})"
                    )));
                }
            }
        }

        let mut chars = text.chars().peekable();
        while let Some(ch) = chars.next() {
            match KeyDefinition::printable(ch) {
                Some(key) => self.dispatch_key(page, &key).await?,
                None => {
                    self.send_page_command(
                        page,
                        "Input.insertText",
                        json!({ "text": ch.to_string() }),
                    )
                    .await?;
                }
            }
            if chars.peek().is_some() && !key_delay.is_zero() {
                sleep(key_delay).await;
            }
        }
        Ok(())
    }

    async fn press_key(&self, page: PageId, key: &str) -> Result<(), AdapterError> {
        let definition = KeyDefinition::named(key).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("unknown key '{key}'"))
        })?;
        self.dispatch_key(page, &definition).await
    }

    async fn evaluate_script(
        &self,
        page: PageId,
        expression: &str,
    ) -> Result<Value, AdapterError> {
        let response = self
            .send_page_command(
                page,
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "awaitPromise": true,
                    "returnByValue": true,
                    "userGesture": true,
                }),
            )
            .await?;

        if let Some(details) = response.get("exceptionDetails") {
            return Err(AdapterError::new(AdapterErrorKind::Internal)
                .with_hint("evaluate_script raised exception")
                .with_data(details.clone()));
        }

        Ok(response
            .get("result")
            .and_then(|res| res.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn page_title(&self, page: PageId) -> Result<String, AdapterError> {
        let value = self.evaluate_script(page, "document.title").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn set_user_agent(
        &self,
        page: PageId,
        user_agent: &str,
        accept_language: Option<&str>,
        platform: Option<&str>,
        locale: Option<&str>,
    ) -> Result<(), AdapterError> {
        let mut params = serde_json::Map::new();
        params.insert("userAgent".into(), Value::String(user_agent.to_string()));
        if let Some(lang) = accept_language {
            params.insert("acceptLanguage".into(), Value::String(lang.to_string()));
        }
        if let Some(platform) = platform {
            params.insert("platform".into(), Value::String(platform.to_string()));
        }
        self.send_page_command(page, "Emulation.setUserAgentOverride", Value::Object(params))
            .await?;

        if let Some(locale) = locale {
            self.send_page_command(page, "Emulation.setLocaleOverride", json!({ "locale": locale }))
                .await?;
        }
        Ok(())
    }

    async fn set_timezone(&self, page: PageId, timezone: &str) -> Result<(), AdapterError> {
        self.send_page_command(
            page,
            "Emulation.setTimezoneOverride",
            json!({ "timezoneId": timezone }),
        )
        .await?;
        Ok(())
    }

    async fn set_device_metrics(
        &self,
        page: PageId,
        width: u32,
        height: u32,
        device_scale_factor: f64,
        mobile: bool,
    ) -> Result<(), AdapterError> {
        self.send_page_command(
            page,
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": width,
                "height": height,
                "deviceScaleFactor": device_scale_factor,
                "mobile": mobile,
            }),
        )
        .await?;
        Ok(())
    }

    async fn set_touch_emulation(&self, page: PageId, enabled: bool) -> Result<(), AdapterError> {
        self.send_page_command(
            page,
            "Emulation.setTouchEmulationEnabled",
            json!({ "enabled": enabled }),
        )
        .await?;
        Ok(())
    }

    async fn add_init_script(&self, page: PageId, source: &str) -> Result<(), AdapterError> {
        self.send_page_command(
            page,
            "Page.addScriptToEvaluateOnNewDocument",
            json!({ "source": source }),
        )
        .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TargetCreatedParams {
    #[serde(rename = "targetInfo")]
    target_info: TargetInfoPayload,
}

#[derive(Debug, Deserialize)]
struct TargetDestroyedParams {
    #[serde(rename = "targetId")]
    target_id: String,
}

#[derive(Debug, Deserialize)]
struct AttachedToTargetParams {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(rename = "targetInfo")]
    target_info: TargetInfoPayload,
}

#[derive(Debug, Deserialize)]
struct DetachedFromTargetParams {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct TargetInfoChangedParams {
    #[serde(rename = "targetInfo")]
    target_info: TargetInfoPayload,
}

#[derive(Debug, Deserialize)]
struct TargetInfoPayload {
    #[serde(rename = "targetId")]
    target_id: String,
    #[serde(rename = "type")]
    target_type: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FrameNavigatedParams {
    frame: FramePayload,
}

#[derive(Debug, Deserialize)]
struct FramePayload {
    #[serde(rename = "parentId")]
    parent_id: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NavigatedWithinDocumentParams {
    #[serde(rename = "frameId")]
    frame_id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct PageLifecycleParams {
    name: String,
    #[serde(rename = "frameId")]
    frame_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NetworkEventParams {
    #[serde(rename = "requestId")]
    request_id: String,
    response: Option<NetworkResponseInfo>,
}

#[derive(Debug, Deserialize)]
struct NetworkResponseInfo {
    status: i64,
}

#[derive(Debug, Deserialize)]
struct ExceptionThrownParams {
    #[serde(rename = "exceptionDetails")]
    exception_details: ExceptionDetails,
}

#[derive(Debug, Deserialize)]
struct ExceptionDetails {
    text: Option<String>,
    exception: Option<ExceptionObject>,
}

#[derive(Debug, Deserialize)]
struct ExceptionObject {
    description: Option<String>,
}

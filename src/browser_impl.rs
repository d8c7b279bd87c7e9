//! Concrete browser session backing a probe run.
//!
//! Launches (or attaches to) Chromium through the CDP adapter, opens one page,
//! fixes its viewport and applies the stealth profile before the flow navigates.

use std::sync::Arc;

use action_flow::Session;
use action_primitives::{ActionPrimitives, DefaultActionPrimitives};
use async_trait::async_trait;
use cdp_adapter::{event_bus, metrics, Cdp, CdpAdapter, CdpConfig, PageId, RawEvent};
use stealth::config::StealthProfileBundle;
use stealth::{StealthControl, StealthRuntime};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::ProbeError;

/// Viewport every run uses
pub const VIEWPORT: (u32, u32) = (1366, 768);

const EVENT_BUFFER: usize = 256;

pub struct BrowserSession {
    adapter: Arc<CdpAdapter>,
    page: PageId,
    primitives: DefaultActionPrimitives,
    event_log: JoinHandle<u64>,
}

impl BrowserSession {
    /// Start the browser and prepare a page for `origin`. If preparation fails the
    /// browser is closed before the error is returned.
    pub async fn launch(
        cfg: CdpConfig,
        bundle: Option<StealthProfileBundle>,
        origin: &str,
    ) -> Result<Self, ProbeError> {
        let (bus, rx) = event_bus(EVENT_BUFFER);
        let event_log = spawn_event_logger(rx);
        let adapter = Arc::new(CdpAdapter::new(cfg, bus));
        if let Err(err) = Arc::clone(&adapter).start().await {
            adapter.close_browser().await;
            event_log.abort();
            return Err(err.into());
        }

        match Self::prepare(&adapter, bundle, origin).await {
            Ok(page) => {
                let cdp: Arc<dyn Cdp> = adapter.clone();
                let primitives = DefaultActionPrimitives::new(cdp, page);
                info!(page = %page.0, %origin, "browser session ready");
                Ok(Self {
                    adapter,
                    page,
                    primitives,
                    event_log,
                })
            }
            Err(err) => {
                warn!(error = %err, "browser session setup failed; closing browser");
                adapter.close_browser().await;
                event_log.abort();
                Err(err)
            }
        }
    }

    async fn prepare(
        adapter: &Arc<CdpAdapter>,
        bundle: Option<StealthProfileBundle>,
        origin: &str,
    ) -> Result<PageId, ProbeError> {
        let page = adapter.create_page("about:blank").await?;
        configure_page(adapter.clone(), page, bundle, origin).await?;
        Ok(page)
    }

    pub fn page(&self) -> PageId {
        self.page
    }

    pub fn adapter(&self) -> &Arc<CdpAdapter> {
        &self.adapter
    }
}

#[async_trait]
impl Session for BrowserSession {
    fn primitives(&self) -> &dyn ActionPrimitives {
        &self.primitives
    }

    async fn release(&self) {
        let snapshot = metrics::snapshot();
        info!(
            commands = snapshot.commands,
            failures = snapshot.command_failures,
            events = snapshot.events,
            mean_latency_us = snapshot.mean_latency_us(),
            "cdp usage"
        );
        self.adapter.close_browser().await;
        self.event_log.abort();
    }
}

/// Apply the stealth profile for `origin`, then pin the viewport. Profiles may
/// carry their own viewport; the fixed one always wins.
async fn configure_page(
    cdp: Arc<dyn Cdp + Send + Sync>,
    page: PageId,
    bundle: Option<StealthProfileBundle>,
    origin: &str,
) -> Result<(), ProbeError> {
    let runtime = StealthRuntime::with_adapter(cdp.clone());
    if let Some(bundle) = bundle {
        runtime.load_bundle(bundle);
    }
    runtime.apply_stealth(origin).await?;
    runtime.ensure_consistency(origin).await?;
    runtime.configure_page(page, origin).await?;
    debug!(%origin, profiles = ?runtime.profile_names(), "stealth applied");

    cdp.set_device_metrics(page, VIEWPORT.0, VIEWPORT.1, 1.0, false)
        .await?;
    Ok(())
}

/// Forward adapter events into the log until the bus closes. Yields the number of
/// adapter errors seen.
fn spawn_event_logger(mut rx: broadcast::Receiver<RawEvent>) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut errors = 0;
        loop {
            match rx.recv().await {
                Ok(RawEvent::Error { page, message }) => {
                    errors += 1;
                    warn!(page = ?page.map(|p| p.0), "{message}");
                }
                Ok(RawEvent::PageNavigated { page, url, same_document, .. }) => {
                    debug!(page = %page.0, %url, same_document, "page navigated");
                }
                Ok(RawEvent::PageLifecycle { page, phase, .. }) => {
                    debug!(page = %page.0, %phase, "page lifecycle");
                }
                Ok(RawEvent::NetworkIdle { page, since_last_activity_ms, .. }) => {
                    debug!(page = %page.0, since_last_activity_ms, "network quiet");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "adapter event channel lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
        errors
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::{AdapterError, NavigationMark, WaitGate};
    use serde_json::Value;
    use std::sync::Mutex;
    use std::time::Duration;
    use stealth::config::{StealthProfile, Viewport};

    #[derive(Default)]
    struct EmulationLog {
        calls: Mutex<Vec<String>>,
    }

    impl EmulationLog {
        fn push(&self, call: String) -> Result<(), AdapterError> {
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    #[async_trait]
    impl Cdp for EmulationLog {
        async fn navigate(&self, _: PageId, _: &str, _: WaitGate, _: Duration) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn reload(&self, _: PageId, _: WaitGate, _: Duration) -> Result<(), AdapterError> {
            Ok(())
        }
        fn navigation_mark(&self, _: PageId) -> NavigationMark {
            NavigationMark::default()
        }
        async fn wait_for_navigation(
            &self,
            _: PageId,
            _: NavigationMark,
            _: WaitGate,
            _: Duration,
        ) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn wait_for_selector(&self, _: PageId, _: &str, _: bool, _: Duration) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn query_count(&self, _: PageId, _: &str) -> Result<usize, AdapterError> {
            Ok(0)
        }
        async fn scroll_into_view(&self, _: PageId, _: &str) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn dom_click(&self, _: PageId, _: &str) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn type_text(&self, _: PageId, _: &str, _: &str, _: Duration, _: Duration) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn press_key(&self, _: PageId, _: &str) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn evaluate_script(&self, _: PageId, _: &str) -> Result<Value, AdapterError> {
            Ok(Value::Null)
        }
        async fn page_title(&self, _: PageId) -> Result<String, AdapterError> {
            Ok(String::new())
        }
        async fn set_user_agent(
            &self,
            _: PageId,
            _: &str,
            _: Option<&str>,
            _: Option<&str>,
            _: Option<&str>,
        ) -> Result<(), AdapterError> {
            self.push("ua".into())
        }
        async fn set_timezone(&self, _: PageId, _: &str) -> Result<(), AdapterError> {
            self.push("tz".into())
        }
        async fn set_device_metrics(&self, _: PageId, width: u32, height: u32, _: f64, mobile: bool) -> Result<(), AdapterError> {
            self.push(format!("viewport {width}x{height} mobile={mobile}"))
        }
        async fn set_touch_emulation(&self, _: PageId, _: bool) -> Result<(), AdapterError> {
            self.push("touch".into())
        }
        async fn add_init_script(&self, _: PageId, _: &str) -> Result<(), AdapterError> {
            self.push("init-script".into())
        }
    }

    #[tokio::test]
    async fn fixed_viewport_wins_over_profile_viewport() {
        let log = Arc::new(EmulationLog::default());
        let mut phone = StealthProfile::desktop_chrome();
        phone.name = "phone".into();
        phone.viewport = Some(Viewport {
            width: 390,
            height: 844,
            device_scale_factor: 3.0,
            mobile: true,
        });
        let bundle = StealthProfileBundle {
            profiles: vec![phone],
            policy: None,
        };

        configure_page(log.clone(), PageId::new(), Some(bundle), "https://www.zeptonow.com")
            .await
            .unwrap();

        let calls = log.calls.lock().unwrap().clone();
        assert_eq!(calls.first().map(String::as_str), Some("init-script"));
        assert!(calls.contains(&"viewport 390x844 mobile=true".to_string()));
        assert_eq!(
            calls.last().map(String::as_str),
            Some("viewport 1366x768 mobile=false")
        );
    }

    #[tokio::test]
    async fn event_logger_counts_errors_until_bus_closes() {
        let (bus, rx) = event_bus(8);
        let logger = spawn_event_logger(rx);
        let page = PageId::new();

        bus.send(RawEvent::PageLifecycle {
            page,
            phase: "opened".into(),
            ts: 0,
        })
        .unwrap();
        bus.send(RawEvent::Error {
            page: Some(page),
            message: "cdp event handling error".into(),
        })
        .unwrap();
        bus.send(RawEvent::Error {
            page: None,
            message: "cdp transport disconnected".into(),
        })
        .unwrap();
        drop(bus);

        assert_eq!(logger.await.unwrap(), 2);
    }
}

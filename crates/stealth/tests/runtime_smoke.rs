use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cdp_adapter::{AdapterError, Cdp, NavigationMark, PageId, WaitGate};
use serde_json::Value;
use stealth::config::{StealthProfile, StealthProfileBundle};
use stealth::{StealthControl, StealthError, StealthRuntime};

/// Records the emulation calls a page receives.
#[derive(Default)]
struct RecordingCdp {
    calls: Mutex<Vec<String>>,
}

impl RecordingCdp {
    fn record(&self, call: impl Into<String>) -> Result<(), AdapterError> {
        self.calls.lock().unwrap().push(call.into());
        Ok(())
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Cdp for RecordingCdp {
    async fn navigate(&self, _: PageId, url: &str, _: WaitGate, _: Duration) -> Result<(), AdapterError> {
        self.record(format!("navigate {url}"))
    }
    async fn reload(&self, _: PageId, _: WaitGate, _: Duration) -> Result<(), AdapterError> {
        self.record("reload")
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
        user_agent: &str,
        _: Option<&str>,
        _: Option<&str>,
        locale: Option<&str>,
    ) -> Result<(), AdapterError> {
        self.record(format!("ua {user_agent} {}", locale.unwrap_or("-")))
    }
    async fn set_timezone(&self, _: PageId, timezone: &str) -> Result<(), AdapterError> {
        self.record(format!("tz {timezone}"))
    }
    async fn set_device_metrics(&self, _: PageId, width: u32, height: u32, _: f64, mobile: bool) -> Result<(), AdapterError> {
        self.record(format!("viewport {width}x{height} mobile={mobile}"))
    }
    async fn set_touch_emulation(&self, _: PageId, enabled: bool) -> Result<(), AdapterError> {
        self.record(format!("touch {enabled}"))
    }
    async fn add_init_script(&self, _: PageId, source: &str) -> Result<(), AdapterError> {
        let marker = if source.contains("webdriver") { "evasion" } else { "other" };
        self.record(format!("init-script {marker}"))
    }
}

#[tokio::test]
async fn configure_page_installs_script_before_overrides() {
    let cdp = Arc::new(RecordingCdp::default());
    let runtime = StealthRuntime::with_adapter(cdp.clone());
    let origin = "https://www.zeptonow.com";

    runtime.apply_stealth(origin).await.unwrap();
    runtime.ensure_consistency(origin).await.unwrap();
    runtime.configure_page(PageId::new(), origin).await.unwrap();

    let calls = cdp.calls();
    assert_eq!(calls[0], "init-script evasion");
    assert!(calls.iter().any(|c| c.starts_with("ua Mozilla/5.0") && c.ends_with("en-IN")));
    assert!(calls.contains(&"tz Asia/Kolkata".to_string()));
    assert!(calls.contains(&"viewport 1366x768 mobile=false".to_string()));
    assert!(!calls.iter().any(|c| c.starts_with("touch")));
}

#[tokio::test]
async fn touch_profile_enables_touch_emulation() {
    let cdp = Arc::new(RecordingCdp::default());
    let runtime = StealthRuntime::with_adapter(cdp.clone());
    let mut tablet = StealthProfile::desktop_chrome();
    tablet.name = "tablet".into();
    tablet.touch = true;
    tablet.timezone = None;
    runtime.load_bundle(StealthProfileBundle {
        profiles: vec![tablet],
        policy: None,
    });

    runtime.apply_stealth("https://shop.test").await.unwrap();
    runtime
        .configure_page(PageId::new(), "https://shop.test")
        .await
        .unwrap();
    let calls = cdp.calls();
    assert!(calls.contains(&"touch true".to_string()));
    assert!(!calls.iter().any(|c| c.starts_with("tz")));
}

#[tokio::test]
async fn configure_page_requires_applied_profile() {
    let cdp = Arc::new(RecordingCdp::default());
    let runtime = StealthRuntime::with_adapter(cdp.clone());
    let err = runtime
        .configure_page(PageId::new(), "https://missing.test")
        .await
        .expect_err("nothing applied");
    assert!(matches!(err, StealthError::PolicyDenied(_)));
    assert!(cdp.calls().is_empty());
}

#[tokio::test]
async fn configure_page_without_adapter_is_internal_error() {
    let runtime = StealthRuntime::new();
    runtime.apply_stealth("https://shop.test").await.unwrap();
    let err = runtime
        .configure_page(PageId::new(), "https://shop.test")
        .await
        .expect_err("no adapter");
    assert!(matches!(err, StealthError::Internal(_)));
}

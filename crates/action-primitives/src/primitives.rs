//! Action primitives implementation
//!
//! Page-bound primitives for browser automation:
//! 1. navigate / reload / wait_for_navigation - navigation with built-in waiting
//! 2. dom_click - click via the element's DOM `click()`
//! 3. type_text / press_key - keyboard input
//! 4. scroll_into_view - bring an element to the viewport centre
//! 5. wait_for_visible - explicit visibility wait
//! 6. count / text_fields / interactable / page_title - read-only inspection

mod click;
mod inspect;
mod navigate;
mod scroll;
mod type_text;
mod wait;

use async_trait::async_trait;
use cdp_adapter::{Cdp, NavigationMark, PageId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    errors::ActionError,
    types::{ActionReport, WaitTier},
};

/// Action primitives bound to a single page.
///
/// Navigation waits issued through [`ActionPrimitives::wait_for_navigation`] only
/// resolve for navigations that commit after the most recent input action
/// (`dom_click`, `type_text`, `press_key`).
#[async_trait]
pub trait ActionPrimitives: Send + Sync {
    async fn navigate(
        &self,
        url: &str,
        wait_tier: WaitTier,
        timeout: Duration,
    ) -> Result<ActionReport, ActionError>;

    async fn page_title(&self) -> Result<String, ActionError>;

    /// Block until `selector` matches a visible element.
    async fn wait_for_visible(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ActionReport, ActionError>;

    async fn count(&self, selector: &str) -> Result<usize, ActionError>;

    async fn scroll_into_view(&self, selector: &str) -> Result<ActionReport, ActionError>;

    /// Click the first element matching `selector` through its DOM `click()`.
    async fn dom_click(&self, selector: &str) -> Result<ActionReport, ActionError>;

    /// Focus `selector` and type `text` one key at a time, `key_delay` apart.
    async fn type_text(
        &self,
        selector: &str,
        text: &str,
        key_delay: Duration,
        timeout: Duration,
    ) -> Result<ActionReport, ActionError>;

    async fn press_key(&self, key: &str) -> Result<ActionReport, ActionError>;

    async fn wait_for_navigation(
        &self,
        wait_tier: WaitTier,
        timeout: Duration,
    ) -> Result<ActionReport, ActionError>;

    async fn reload(
        &self,
        wait_tier: WaitTier,
        timeout: Duration,
    ) -> Result<ActionReport, ActionError>;

    /// For every element matching `container` (document order), the trimmed inner text
    /// of the first match of each selector in `fields`; empty text counts as absent.
    async fn text_fields(
        &self,
        container: &str,
        fields: &[&str],
    ) -> Result<Vec<Vec<Option<String>>>, ActionError>;

    /// `None` when nothing matches; otherwise whether the element is neither fully
    /// transparent nor disabled.
    async fn interactable(&self, selector: &str) -> Result<Option<bool>, ActionError>;
}

/// Default implementation of action primitives over the CDP adapter
pub struct DefaultActionPrimitives {
    /// CDP surface for browser communication
    adapter: Arc<dyn Cdp>,

    /// Page every primitive acts on
    page: PageId,

    /// Navigation mark taken before the latest input action
    nav_marker: AtomicU64,
}

impl DefaultActionPrimitives {
    pub fn new(adapter: Arc<dyn Cdp>, page: PageId) -> Self {
        let mark = adapter.navigation_mark(page);
        Self {
            adapter,
            page,
            nav_marker: AtomicU64::new(mark.0),
        }
    }

    /// Get reference to CDP adapter
    pub fn adapter(&self) -> &Arc<dyn Cdp> {
        &self.adapter
    }

    pub fn page(&self) -> PageId {
        self.page
    }

    /// Remember the current navigation count as the baseline for the next wait.
    pub(crate) fn mark_navigation(&self) {
        let mark = self.adapter.navigation_mark(self.page);
        self.nav_marker.store(mark.0, Ordering::SeqCst);
    }

    pub(crate) fn navigation_baseline(&self) -> NavigationMark {
        NavigationMark(self.nav_marker.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl ActionPrimitives for DefaultActionPrimitives {
    async fn navigate(
        &self,
        url: &str,
        wait_tier: WaitTier,
        timeout: Duration,
    ) -> Result<ActionReport, ActionError> {
        navigate::execute_navigate(self, url, wait_tier, timeout).await
    }

    async fn page_title(&self) -> Result<String, ActionError> {
        inspect::page_title(self).await
    }

    async fn wait_for_visible(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ActionReport, ActionError> {
        wait::execute_wait_visible(self, selector, timeout).await
    }

    async fn count(&self, selector: &str) -> Result<usize, ActionError> {
        inspect::count(self, selector).await
    }

    async fn scroll_into_view(&self, selector: &str) -> Result<ActionReport, ActionError> {
        scroll::execute_scroll_into_view(self, selector).await
    }

    async fn dom_click(&self, selector: &str) -> Result<ActionReport, ActionError> {
        click::execute_dom_click(self, selector).await
    }

    async fn type_text(
        &self,
        selector: &str,
        text: &str,
        key_delay: Duration,
        timeout: Duration,
    ) -> Result<ActionReport, ActionError> {
        type_text::execute_type_text(self, selector, text, key_delay, timeout).await
    }

    async fn press_key(&self, key: &str) -> Result<ActionReport, ActionError> {
        type_text::execute_press_key(self, key).await
    }

    async fn wait_for_navigation(
        &self,
        wait_tier: WaitTier,
        timeout: Duration,
    ) -> Result<ActionReport, ActionError> {
        navigate::execute_wait_for_navigation(self, wait_tier, timeout).await
    }

    async fn reload(
        &self,
        wait_tier: WaitTier,
        timeout: Duration,
    ) -> Result<ActionReport, ActionError> {
        navigate::execute_reload(self, wait_tier, timeout).await
    }

    async fn text_fields(
        &self,
        container: &str,
        fields: &[&str],
    ) -> Result<Vec<Vec<Option<String>>>, ActionError> {
        inspect::text_fields(self, container, fields).await
    }

    async fn interactable(&self, selector: &str) -> Result<Option<bool>, ActionError> {
        inspect::interactable(self, selector).await
    }
}

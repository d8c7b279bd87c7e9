//! Adapter registry keeping track of attached pages and their CDP sessions.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::commands::NavigationState;
use crate::ids::{PageId, SessionId};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetContext {
    pub session_id: SessionId,
    pub target_id: Option<String>,
    pub cdp_session: Option<String>,
    pub recent_url: Option<String>,
    #[serde(skip)]
    pub navigation: NavigationState,
}

/// Concurrent registry for pages and sessions.
pub struct Registry {
    pages: DashMap<PageId, TargetContext>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            pages: DashMap::new(),
        }
    }

    pub fn insert_page(
        &self,
        page: PageId,
        session: SessionId,
        target_id: Option<String>,
        cdp_session: Option<String>,
    ) {
        let ctx = TargetContext {
            session_id: session,
            target_id,
            cdp_session,
            recent_url: None,
            navigation: NavigationState::default(),
        };
        self.pages.insert(page, ctx);
    }

    pub fn remove_page(&self, page: &PageId) {
        self.pages.remove(page);
    }

    pub fn get(&self, page: &PageId) -> Option<TargetContext> {
        self.pages.get(page).map(|entry| entry.value().clone())
    }

    pub fn pages(&self) -> Vec<PageId> {
        self.pages.iter().map(|kv| *kv.key()).collect()
    }

    pub fn clear(&self) {
        self.pages.clear();
    }

    pub fn set_recent_url(&self, page: &PageId, url: String) {
        if let Some(mut entry) = self.pages.get_mut(page) {
            entry.recent_url = Some(url);
        }
    }

    pub fn set_cdp_session(&self, page: &PageId, session: String) {
        if let Some(mut entry) = self.pages.get_mut(page) {
            entry.cdp_session = Some(session);
        }
    }

    pub fn get_cdp_session(&self, page: &PageId) -> Option<String> {
        self.pages
            .get(page)
            .and_then(|entry| entry.cdp_session.clone())
    }

    /// Main-frame id equals the page's target id for top-level targets.
    pub fn is_main_frame(&self, page: &PageId, frame_id: &str) -> bool {
        self.pages
            .get(page)
            .and_then(|entry| entry.target_id.as_deref().map(|t| t == frame_id))
            .unwrap_or(false)
    }

    pub fn update_navigation<F>(&self, page: &PageId, f: F) -> Option<NavigationState>
    where
        F: FnOnce(&mut NavigationState),
    {
        self.pages.get_mut(page).map(|mut entry| {
            f(&mut entry.navigation);
            entry.navigation
        })
    }

    pub fn navigation(&self, page: &PageId) -> Option<NavigationState> {
        self.pages.get(page).map(|entry| entry.navigation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_frame_matches_target_id() {
        let registry = Registry::new();
        let page = PageId::new();
        registry.insert_page(page, SessionId::new(), Some("T1".into()), None);
        assert!(registry.is_main_frame(&page, "T1"));
        assert!(!registry.is_main_frame(&page, "child-frame"));

        registry.update_navigation(&page, |nav| nav.begin(false));
        assert_eq!(registry.navigation(&page).map(|n| n.seq), Some(1));
    }
}

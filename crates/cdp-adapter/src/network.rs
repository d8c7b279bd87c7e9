//! Per-page in-flight request accounting backing the network-quiet wait gate.

use std::collections::HashSet;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::ids::PageId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TapEvent {
    RequestWillBeSent { request_id: String },
    ResponseReceived { request_id: String, status: i64 },
    LoadingFinished { request_id: String },
    LoadingFailed { request_id: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkSnapshot {
    pub requests: u64,
    pub failures: u64,
    pub inflight: u64,
    pub since_last_activity_ms: u64,
}

impl NetworkSnapshot {
    pub fn is_quiet(&self, window_ms: u64, max_inflight: u32) -> bool {
        self.inflight <= max_inflight as u64 && self.since_last_activity_ms >= window_ms
    }
}

#[derive(Debug)]
struct Counters {
    requests: u64,
    failures: u64,
    inflight: HashSet<String>,
    last_activity: Instant,
}

impl Counters {
    fn new() -> Self {
        Self {
            requests: 0,
            failures: 0,
            inflight: HashSet::new(),
            last_activity: Instant::now(),
        }
    }

    fn register(&mut self, event: TapEvent, now: Instant) {
        match event {
            TapEvent::RequestWillBeSent { request_id } => {
                // redirects reuse the request id
                if self.inflight.insert(request_id) {
                    self.requests += 1;
                }
            }
            TapEvent::ResponseReceived { status, .. } => {
                if status >= 400 {
                    self.failures += 1;
                }
            }
            TapEvent::LoadingFinished { request_id } => {
                self.inflight.remove(&request_id);
            }
            TapEvent::LoadingFailed { request_id } => {
                self.failures += 1;
                self.inflight.remove(&request_id);
            }
        }
        self.last_activity = now;
    }

    fn snapshot(&self, now: Instant) -> NetworkSnapshot {
        NetworkSnapshot {
            requests: self.requests,
            failures: self.failures,
            inflight: self.inflight.len() as u64,
            since_last_activity_ms: now.saturating_duration_since(self.last_activity).as_millis()
                as u64,
        }
    }
}

/// Tracks network activity for every attached page.
#[derive(Default)]
pub struct NetworkTracker {
    pages: DashMap<PageId, Counters>,
}

impl NetworkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&self, page: PageId, event: TapEvent) -> NetworkSnapshot {
        let now = Instant::now();
        let mut counters = self.pages.entry(page).or_insert_with(Counters::new);
        counters.register(event, now);
        counters.snapshot(now)
    }

    /// A new document discards requests belonging to the previous one.
    pub fn reset(&self, page: PageId) {
        self.pages.insert(page, Counters::new());
    }

    pub fn remove(&self, page: &PageId) {
        self.pages.remove(page);
    }

    pub fn clear(&self) {
        self.pages.clear();
    }

    pub fn snapshot(&self, page: PageId) -> NetworkSnapshot {
        let now = Instant::now();
        self.pages
            .entry(page)
            .or_insert_with(Counters::new)
            .snapshot(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(id: &str) -> TapEvent {
        TapEvent::RequestWillBeSent {
            request_id: id.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_after_window_with_nothing_inflight() {
        let tracker = NetworkTracker::new();
        let page = PageId::new();

        let snap = tracker.ingest(page, request("1"));
        assert_eq!(snap.inflight, 1);
        assert!(!snap.is_quiet(500, 0));

        tracker.ingest(
            page,
            TapEvent::LoadingFinished {
                request_id: "1".into(),
            },
        );
        assert!(!tracker.snapshot(page).is_quiet(500, 0));

        tokio::time::advance(Duration::from_millis(500)).await;
        let snap = tracker.snapshot(page);
        assert_eq!(snap.inflight, 0);
        assert!(snap.is_quiet(500, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn redirect_does_not_double_count() {
        let tracker = NetworkTracker::new();
        let page = PageId::new();
        tracker.ingest(page, request("r"));
        let snap = tracker.ingest(page, request("r"));
        assert_eq!(snap.inflight, 1);
        assert_eq!(snap.requests, 1);

        let snap = tracker.ingest(
            page,
            TapEvent::LoadingFailed {
                request_id: "r".into(),
            },
        );
        assert_eq!(snap.inflight, 0);
        assert_eq!(snap.failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_forgets_previous_document() {
        let tracker = NetworkTracker::new();
        let page = PageId::new();
        tracker.ingest(page, request("a"));
        tracker.reset(page);
        assert_eq!(tracker.snapshot(page).inflight, 0);
    }
}

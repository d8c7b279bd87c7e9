use serde::{Deserialize, Serialize};

/// Readiness milestone a navigation must reach before it counts as settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitGate {
    /// `DOMContentLoaded` fired for the main frame.
    DomReady,
    /// `load` fired for the main frame.
    Load,
    /// No more than `max_inflight` requests for at least `window_ms`.
    NetworkQuiet { window_ms: u64, max_inflight: u32 },
}

impl WaitGate {
    /// Zero in-flight requests for 500 ms.
    pub const NETWORK_IDLE: WaitGate = WaitGate::NetworkQuiet {
        window_ms: 500,
        max_inflight: 0,
    };
}

/// Opaque marker of the main-frame navigation count at some instant.
///
/// A wait started from a mark only resolves for navigations that commit after it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct NavigationMark(pub u64);

/// Per-page navigation progress fed by `Page.*` lifecycle events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NavigationState {
    pub seq: u64,
    pub dom_ready: bool,
    pub loaded: bool,
    pub same_document: bool,
}

impl NavigationState {
    pub fn begin(&mut self, same_document: bool) {
        self.seq += 1;
        self.same_document = same_document;
        // history-API navigations never refire lifecycle events
        self.dom_ready = same_document;
        self.loaded = same_document;
    }

    pub fn mark(&self) -> NavigationMark {
        NavigationMark(self.seq)
    }

    pub fn navigated_since(&self, mark: NavigationMark) -> bool {
        self.seq > mark.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_document_navigation_is_immediately_loaded() {
        let mut state = NavigationState::default();
        let mark = state.mark();
        state.begin(true);
        assert!(state.navigated_since(mark));
        assert!(state.dom_ready && state.loaded);

        let mark = state.mark();
        state.begin(false);
        assert!(state.navigated_since(mark));
        assert!(!state.dom_ready && !state.loaded);
    }
}

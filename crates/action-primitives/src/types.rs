//! Core data types for action primitives

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Built-in waiting tiers for navigations
///
/// - DomReady: `DOMContentLoaded` of the new document
/// - Load: the `load` event of the new document
/// - Idle: DOM ready plus 500 ms without in-flight requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WaitTier {
    #[default]
    DomReady,
    Load,
    Idle,
}

/// Outcome record of one executed primitive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReport {
    pub action_id: String,

    /// Primitive name, e.g. `click`
    pub action: String,

    /// Selector or URL the action targeted
    pub target: Option<String>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub finished_at: DateTime<Utc>,

    pub latency_ms: u64,
}

impl ActionReport {
    /// Create a successful action report
    pub fn success(action: &str, started_at: DateTime<Utc>, latency_ms: u64) -> Self {
        Self {
            action_id: Uuid::new_v4().to_string(),
            action: action.to_string(),
            target: None,
            started_at,
            finished_at: Utc::now(),
            latency_ms,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_tier_defaults_to_dom_ready() {
        assert_eq!(WaitTier::default(), WaitTier::DomReady);
    }

    #[test]
    fn report_serializes_millisecond_timestamps() {
        let report = ActionReport::success("click", Utc::now(), 12).with_target("#go");
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["started_at"].is_i64());
        assert_eq!(json["target"], "#go");
        assert_eq!(json["action"], "click");
    }
}

//! Navigate primitive - navigation with built-in waiting

use crate::{
    errors::ActionError, primitives::DefaultActionPrimitives, types::ActionReport,
    types::WaitTier, waiting::gate_for_tier,
};
use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Execute navigate primitive
///
/// Steps:
/// 1. Validate the URL
/// 2. Issue `Page.navigate` and wait for the tier's gate on the new document
/// 3. Generate action report
pub async fn execute_navigate(
    primitives: &DefaultActionPrimitives,
    url: &str,
    wait_tier: WaitTier,
    timeout: Duration,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(url = %url, wait_tier = ?wait_tier, "Executing navigate primitive");

    if !valid_url(url) {
        return Err(ActionError::Internal(format!("Invalid URL: '{}'", url)));
    }

    primitives
        .adapter()
        .navigate(primitives.page(), url, gate_for_tier(wait_tier), timeout)
        .await
        .map_err(|err| {
            warn!(url = %url, "navigation failed: {}", err);
            ActionError::from_adapter(err, None)
        })?;
    primitives.mark_navigation();

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    info!(latency_ms, "Navigate completed successfully");
    Ok(ActionReport::success("navigate", started_at, latency_ms).with_target(url))
}

/// Wait for a navigation triggered by the latest input action.
pub async fn execute_wait_for_navigation(
    primitives: &DefaultActionPrimitives,
    wait_tier: WaitTier,
    timeout: Duration,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();
    let since = primitives.navigation_baseline();

    debug!(wait_tier = ?wait_tier, since = since.0, "Waiting for navigation");
    primitives
        .adapter()
        .wait_for_navigation(primitives.page(), since, gate_for_tier(wait_tier), timeout)
        .await
        .map_err(|err| ActionError::from_adapter(err, None))?;
    primitives.mark_navigation();

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    info!(latency_ms, wait_tier = ?wait_tier, "Navigation settled");
    Ok(ActionReport::success("wait_for_navigation", started_at, latency_ms))
}

pub async fn execute_reload(
    primitives: &DefaultActionPrimitives,
    wait_tier: WaitTier,
    timeout: Duration,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(wait_tier = ?wait_tier, "Executing reload primitive");
    primitives
        .adapter()
        .reload(primitives.page(), gate_for_tier(wait_tier), timeout)
        .await
        .map_err(|err| ActionError::from_adapter(err, None))?;
    primitives.mark_navigation();

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    Ok(ActionReport::success("reload", started_at, latency_ms))
}

fn valid_url(url: &str) -> bool {
    !url.is_empty()
        && (url.starts_with("http://")
            || url.starts_with("https://")
            || url.starts_with("file://")
            || url.starts_with("data:"))
}

#[cfg(test)]
mod tests {
    use super::valid_url;

    #[test]
    fn test_url_validation() {
        assert!(valid_url("https://www.zeptonow.com/"));
        assert!(valid_url("http://localhost:8080"));
        assert!(valid_url("file:///path/to/file.html"));

        assert!(!valid_url(""));
        assert!(!valid_url("zeptonow.com"));
        assert!(!valid_url("ftp://example.com"));
    }
}

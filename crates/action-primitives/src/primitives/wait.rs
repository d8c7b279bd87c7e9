//! Wait primitive - explicit visibility wait

use crate::{errors::ActionError, primitives::DefaultActionPrimitives, types::ActionReport};
use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Poll until `selector` matches an element with a non-empty box that is not
/// `visibility: hidden`, or fail with `WaitTimeout` once `timeout` elapses.
pub async fn execute_wait_visible(
    primitives: &DefaultActionPrimitives,
    selector: &str,
    timeout: Duration,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    debug!(selector = %selector, timeout_ms = timeout.as_millis() as u64, "Waiting for element");
    primitives
        .adapter()
        .wait_for_selector(primitives.page(), selector, true, timeout)
        .await
        .map_err(|err| {
            warn!(selector = %selector, "wait failed: {}", err);
            ActionError::from_adapter(err, Some(selector))
        })?;

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    debug!(selector = %selector, latency_ms, "Element visible");
    Ok(ActionReport::success("wait", started_at, latency_ms).with_target(selector))
}

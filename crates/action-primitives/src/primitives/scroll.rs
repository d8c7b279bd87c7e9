//! Scroll primitive - bring an element into view

use crate::{errors::ActionError, primitives::DefaultActionPrimitives, types::ActionReport};
use chrono::Utc;
use std::time::Instant;
use tracing::debug;

pub async fn execute_scroll_into_view(
    primitives: &DefaultActionPrimitives,
    selector: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    primitives
        .adapter()
        .scroll_into_view(primitives.page(), selector)
        .await
        .map_err(|err| ActionError::from_adapter(err, Some(selector)))?;

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    debug!(selector = %selector, latency_ms, "Scrolled into view");
    Ok(ActionReport::success("scroll", started_at, latency_ms).with_target(selector))
}

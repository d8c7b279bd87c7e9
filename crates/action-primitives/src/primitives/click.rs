//! Click primitive - DOM click on the first matching element

use crate::{errors::ActionError, primitives::DefaultActionPrimitives, types::ActionReport};
use cdp_adapter::AdapterErrorKind;
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, info};

/// Execute click primitive
///
/// Re-queries `selector` inside the page and invokes the element's `click()`, which
/// fires the element's handlers even when an overlay would intercept a pointer event.
pub async fn execute_dom_click(
    primitives: &DefaultActionPrimitives,
    selector: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    debug!(selector = %selector, "Executing click primitive");
    primitives.mark_navigation();
    primitives
        .adapter()
        .dom_click(primitives.page(), selector)
        .await
        .map_err(|err| match err.kind {
            // evaluate raised inside the element's click handlers
            AdapterErrorKind::Internal => {
                ActionError::NotClickable(format!("{} (selector '{}')", err, selector))
            }
            _ => ActionError::from_adapter(err, Some(selector)),
        })?;

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    info!(selector = %selector, latency_ms, "Click completed successfully");
    Ok(ActionReport::success("click", started_at, latency_ms).with_target(selector))
}

//! Type primitive - keyboard input

use crate::{errors::ActionError, primitives::DefaultActionPrimitives, types::ActionReport};
use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Execute type_text primitive
///
/// Focuses `selector` (waiting up to `timeout` for it to exist) and dispatches one
/// key event pair per character with `key_delay` between characters.
pub async fn execute_type_text(
    primitives: &DefaultActionPrimitives,
    selector: &str,
    text: &str,
    key_delay: Duration,
    timeout: Duration,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    debug!(
        selector = %selector,
        chars = text.chars().count(),
        key_delay_ms = key_delay.as_millis() as u64,
        "Executing type_text primitive"
    );

    primitives.mark_navigation();
    primitives
        .adapter()
        .type_text(primitives.page(), selector, text, key_delay, timeout)
        .await
        .map_err(|err| ActionError::from_adapter(err, Some(selector)))?;

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    info!(selector = %selector, latency_ms, "Typing completed successfully");
    Ok(ActionReport::success("type_text", started_at, latency_ms).with_target(selector))
}

pub async fn execute_press_key(
    primitives: &DefaultActionPrimitives,
    key: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    primitives.mark_navigation();
    primitives
        .adapter()
        .press_key(primitives.page(), key)
        .await
        .map_err(|err| ActionError::from_adapter(err, None))?;

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    debug!(key = %key, latency_ms, "Key pressed");
    Ok(ActionReport::success("press_key", started_at, latency_ms).with_target(key))
}

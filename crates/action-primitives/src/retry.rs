//! Bounded retry around fallible actions, and the retried click built on it.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{errors::ActionError, primitives::ActionPrimitives, types::ActionReport};

/// Fixed-delay retry policy. `max_attempts` attempts are separated by
/// `max_attempts - 1` delays; nothing sleeps after the last failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Run `op` until it succeeds or the attempts are spent. Per-attempt errors are
    /// logged and swallowed; exhaustion yields `ActionFailed { selector: target }`.
    pub async fn run<T, F, Fut>(&self, target: &str, mut op: F) -> Result<T, ActionError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ActionError>>,
    {
        let attempts = self.max_attempts.max(1);
        for attempt in 1..=attempts {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(
                        target = %target,
                        attempt,
                        max_attempts = attempts,
                        error = %err,
                        "attempt failed"
                    );
                    if attempt < attempts {
                        sleep(self.delay).await;
                    }
                }
            }
        }
        error!(target = %target, attempts, "giving up after {} attempt(s)", attempts);
        Err(ActionError::ActionFailed {
            selector: target.to_string(),
            attempts,
        })
    }
}

/// Wait for `selector` to be visible, scroll it into view and DOM-click it,
/// retrying the whole sequence under `policy`.
pub async fn click_with_retry<P>(
    primitives: &P,
    selector: &str,
    policy: RetryPolicy,
    wait_timeout: Duration,
) -> Result<ActionReport, ActionError>
where
    P: ActionPrimitives + ?Sized,
{
    let report = policy
        .run(selector, |_| async move {
            primitives.wait_for_visible(selector, wait_timeout).await?;
            primitives.scroll_into_view(selector).await?;
            primitives.dom_click(selector).await
        })
        .await?;
    info!(selector = %selector, "Successfully clicked");
    Ok(report)
}

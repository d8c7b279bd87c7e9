//! Session lifecycle: one exclusively owned page per run, released exactly once.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};

use action_primitives::ActionPrimitives;
use async_trait::async_trait;
use futures::FutureExt;
use tracing::{error, info};

use crate::errors::FlowError;

/// A browser + page pair acquired for a single run.
#[async_trait]
pub trait Session: Send + Sync {
    /// Actions bound to the session's page.
    fn primitives(&self) -> &dyn ActionPrimitives;

    /// Tear down the browser. Implementations log their own failures.
    async fn release(&self);
}

/// Exclusive owner of a [`Session`] that releases it at most once.
pub struct SessionHandle<S: Session> {
    session: S,
    released: AtomicBool,
}

impl<S: Session> SessionHandle<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            released: AtomicBool::new(false),
        }
    }

    pub fn primitives(&self) -> &dyn ActionPrimitives {
        self.session.primitives()
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Release the session; returns `false` when it was already released.
    pub async fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!("Closing browser");
        self.session.release().await;
        true
    }
}

/// Drive `flow` to completion and release the session on every exit path.
///
/// A panic inside `flow` is caught and surfaced as [`FlowError::Aborted`] after
/// the release has run.
pub async fn run_in_session<S, T, F>(handle: &SessionHandle<S>, flow: F) -> Result<T, FlowError>
where
    S: Session,
    F: Future<Output = Result<T, FlowError>>,
{
    let outcome = AssertUnwindSafe(flow).catch_unwind().await;
    handle.release().await;

    match outcome {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(%message, "probe flow panicked");
            Err(FlowError::Aborted(message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

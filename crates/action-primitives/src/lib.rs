//! Page-bound action primitives over the CDP adapter
//!
//! This crate provides the building blocks the probe flow is composed from:
//! - navigation with DomReady / Load / Idle waiting tiers
//! - visibility waits, DOM clicks, keyboard input, scrolling
//! - read-only inspection (counts, text projections, interactability)
//! - a fixed-delay retry policy and the retried click built on it

pub mod errors;
mod primitives;
pub mod retry;
pub mod types;
mod waiting;

pub use errors::*;
pub use primitives::*;
pub use retry::*;
pub use types::*;
pub use waiting::*;

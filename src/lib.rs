//! stockprobe library
//!
//! Exposes the CLI entry point, configuration and reporting for integration testing

pub mod browser_impl;
pub mod cli;
pub mod config;
pub mod errors;
pub mod report;

pub use browser_impl::BrowserSession;
pub use config::ProbeConfig;
pub use errors::ProbeError;
pub use report::{ConsoleReporter, RunReport};

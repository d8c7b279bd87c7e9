pub mod app;
pub mod env;
pub mod output;
pub mod runtime;

pub use app::run;
pub use env::CliArgs;
pub use output::{LogFormat, OutputFormat};

use clap::Parser;
use std::path::PathBuf;

use super::output::{LogFormat, OutputFormat};
use crate::config::ConfigOverrides;

/// Check whether a product can be ordered at a delivery location
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Delivery city (overrides location.city)
    #[arg(long)]
    pub city: Option<String>,

    /// Product to search for (overrides location.product)
    #[arg(long)]
    pub product: Option<String>,

    /// Global wait deadline in milliseconds
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_ms: Option<u64>,

    /// Storefront entry URL
    #[arg(long, value_name = "URL")]
    pub site_url: Option<String>,

    /// Chrome/Chromium executable
    #[arg(long, value_name = "PATH")]
    pub chrome: Option<PathBuf>,

    /// Attach to a running browser's DevTools websocket instead of launching one
    #[arg(long, value_name = "URL")]
    pub ws_url: Option<String>,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// Stealth profile bundle (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    pub stealth_profile: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    pub output: OutputFormat,

    /// Log level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable debug mode
    #[arg(short, long)]
    pub debug: bool,

    /// Log line format
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Also write logs to this file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

impl CliArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            city: self.city.clone(),
            product: self.product.clone(),
            timeout_ms: self.timeout_ms,
            site_url: self.site_url.clone(),
            chrome: self.chrome.clone(),
            ws_url: self.ws_url.clone(),
            headful: self.headful,
            stealth_bundle: self.stealth_profile.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_become_overrides() {
        let args = CliArgs::parse_from([
            "stockprobe",
            "--city",
            "Pune",
            "--product",
            "milk",
            "--timeout-ms",
            "1500",
            "--headful",
            "--output",
            "json",
        ]);
        let overrides = args.overrides();
        assert_eq!(overrides.city.as_deref(), Some("Pune"));
        assert_eq!(overrides.timeout_ms, Some(1500));
        assert!(overrides.headful);
        assert_eq!(args.output, OutputFormat::Json);
        assert_eq!(args.log_format, LogFormat::Text);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(CliArgs::try_parse_from(["stockprobe", "--timeout-ms", "0"]).is_err());
    }
}

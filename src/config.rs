//! Configuration management module
//!
//! The probe reads one document, JSON first with a YAML fallback:
//!
//! ```json
//! { "timeout": 60000,
//!   "location": { "city": "Pune", "product": "milk" },
//!   "site": { "url": "https://www.zeptonow.com/" },
//!   "browser": { "headless": true },
//!   "stealth": { "bundle": "profiles.yaml" } }
//! ```
//!
//! Command-line values override the file; missing city or product is a startup error.

use std::path::{Path, PathBuf};

use action_flow::{site::DEFAULT_SITE_URL, RunConfig};
use cdp_adapter::CdpConfig;
use serde::{Deserialize, Serialize};

use crate::errors::ProbeError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Global wait deadline in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub stealth: StealthSettings,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            location: LocationConfig::default(),
            site: SiteConfig::default(),
            browser: BrowserSettings::default(),
            stealth: StealthSettings::default(),
        }
    }
}

fn default_timeout() -> u64 {
    RunConfig::DEFAULT_TIMEOUT_MS
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationConfig {
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub product: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SITE_URL.to_string(),
        }
    }
}

/// Launch settings; unset fields keep the adapter defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserSettings {
    #[serde(default)]
    pub headless: Option<bool>,
    #[serde(default)]
    pub executable: Option<PathBuf>,
    #[serde(default)]
    pub websocket_url: Option<String>,
    #[serde(default)]
    pub user_data_dir: Option<PathBuf>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl BrowserSettings {
    pub fn to_cdp_config(&self) -> CdpConfig {
        let mut cfg = CdpConfig::default();
        if let Some(headless) = self.headless {
            cfg.headless = headless;
        }
        if let Some(executable) = &self.executable {
            cfg.executable = executable.clone();
        }
        if let Some(dir) = &self.user_data_dir {
            cfg.user_data_dir = dir.clone();
        }
        cfg.websocket_url = self.websocket_url.clone();
        cfg.extra_args.extend(self.extra_args.iter().cloned());
        cfg
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StealthSettings {
    /// Profile bundle file (JSON or YAML)
    #[serde(default)]
    pub bundle: Option<PathBuf>,
}

/// Values supplied on the command line
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub city: Option<String>,
    pub product: Option<String>,
    pub timeout_ms: Option<u64>,
    pub site_url: Option<String>,
    pub chrome: Option<PathBuf>,
    pub ws_url: Option<String>,
    pub headful: bool,
    pub stealth_bundle: Option<PathBuf>,
}

impl ProbeConfig {
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(city) = &overrides.city {
            self.location.city = city.clone();
        }
        if let Some(product) = &overrides.product {
            self.location.product = product.clone();
        }
        if let Some(timeout) = overrides.timeout_ms {
            self.timeout = timeout;
        }
        if let Some(url) = &overrides.site_url {
            self.site.url = url.clone();
        }
        if let Some(chrome) = &overrides.chrome {
            self.browser.executable = Some(chrome.clone());
        }
        if let Some(ws) = &overrides.ws_url {
            self.browser.websocket_url = Some(ws.clone());
        }
        if overrides.headful {
            self.browser.headless = Some(false);
        }
        if let Some(bundle) = &overrides.stealth_bundle {
            self.stealth.bundle = Some(bundle.clone());
        }
    }

    /// The validated inputs of one run.
    pub fn run_config(&self) -> Result<RunConfig, ProbeError> {
        let city = self.location.city.trim();
        let product = self.location.product.trim();
        if city.is_empty() {
            return Err(ProbeError::config("location.city is required"));
        }
        if product.is_empty() {
            return Err(ProbeError::config("location.product is required"));
        }
        if self.timeout == 0 {
            return Err(ProbeError::config("timeout must be a positive number of milliseconds"));
        }
        url::Url::parse(&self.site.url)
            .map_err(|err| ProbeError::config(format!("site.url '{}': {err}", self.site.url)))?;
        Ok(RunConfig::new(city, product).with_timeout_ms(self.timeout))
    }

    /// Browser launch settings. Single CDP commands such as `Page.navigate` may
    /// run as long as the global wait deadline.
    pub fn cdp_config(&self) -> CdpConfig {
        let mut cfg = self.browser.to_cdp_config();
        cfg.default_deadline_ms = cfg.default_deadline_ms.max(self.timeout);
        cfg
    }

    /// Origin the stealth profile is resolved for.
    pub fn site_origin(&self) -> Result<String, ProbeError> {
        let url = url::Url::parse(&self.site.url)
            .map_err(|err| ProbeError::config(format!("site.url '{}': {err}", self.site.url)))?;
        Ok(url.origin().ascii_serialization())
    }
}

pub fn parse_config_str(raw: &str) -> Result<ProbeConfig, ProbeError> {
    match serde_json::from_str::<ProbeConfig>(raw) {
        Ok(config) => Ok(config),
        Err(json_err) => serde_yaml::from_str::<ProbeConfig>(raw).map_err(|yaml_err| {
            ProbeError::config(format!(
                "not valid JSON ({json_err}) or YAML ({yaml_err})"
            ))
        }),
    }
}

pub fn load_config_from_path(path: &Path) -> Result<ProbeConfig, ProbeError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ProbeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config_str(&raw)
        .map_err(|err| ProbeError::config(format!("{}: {err}", path.display())))
}

/// Candidate locations, most specific first.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("config.json"),
        PathBuf::from("config").join("config.yaml"),
    ];
    if let Some(mut dir) = dirs::config_dir() {
        dir.push("stockprobe");
        dir.push("config.json");
        paths.push(dir);
    }
    paths
}

/// Resolve the file to read: an explicit path must exist, otherwise the first
/// existing default wins.
pub fn locate_config(explicit: Option<&Path>) -> Result<Option<PathBuf>, ProbeError> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ProbeError::config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        return Ok(Some(path.to_path_buf()));
    }
    Ok(default_config_paths().into_iter().find(|p| p.exists()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_document_with_defaults() {
        let config =
            parse_config_str(r#"{ "location": { "city": "Pune", "product": "milk" } }"#).unwrap();
        assert_eq!(config.timeout, 60_000);
        assert_eq!(config.site.url, DEFAULT_SITE_URL);
        let run = config.run_config().unwrap();
        assert_eq!(run.city, "Pune");
        assert_eq!(run.timeout_ms, 60_000);
    }

    #[test]
    fn yaml_fallback() {
        let config = parse_config_str(
            "timeout: 30000\nlocation:\n  city: Mumbai\n  product: bread\nbrowser:\n  headless: false\n",
        )
        .unwrap();
        assert_eq!(config.timeout, 30_000);
        assert_eq!(config.location.product, "bread");
        assert_eq!(config.browser.headless, Some(false));
        assert!(!config.browser.to_cdp_config().headless);
    }

    #[test]
    fn missing_product_is_startup_error() {
        let config = parse_config_str(r#"{ "location": { "city": "Pune" } }"#).unwrap();
        let err = config.run_config().unwrap_err();
        assert!(err.to_string().contains("location.product"));
    }

    #[test]
    fn overrides_win_over_file() {
        let mut config =
            parse_config_str(r#"{ "timeout": 1000, "location": { "city": "Pune", "product": "milk" } }"#)
                .unwrap();
        config.apply_overrides(&ConfigOverrides {
            city: Some("Delhi".into()),
            timeout_ms: Some(5000),
            headful: true,
            ..ConfigOverrides::default()
        });
        let run = config.run_config().unwrap();
        assert_eq!(run.city, "Delhi");
        assert_eq!(run.product, "milk");
        assert_eq!(run.timeout_ms, 5000);
        assert_eq!(config.browser.headless, Some(false));
    }

    #[test]
    fn command_deadline_follows_long_timeouts() {
        let config = parse_config_str(
            r#"{ "timeout": 120000, "location": { "city": "Pune", "product": "milk" } }"#,
        )
        .unwrap();
        assert_eq!(config.cdp_config().default_deadline_ms, 120_000);

        let short = parse_config_str(
            r#"{ "timeout": 5000, "location": { "city": "Pune", "product": "milk" } }"#,
        )
        .unwrap();
        assert_eq!(
            short.cdp_config().default_deadline_ms,
            CdpConfig::default().default_deadline_ms
        );
    }

    #[test]
    fn origin_drops_path() {
        let config = ProbeConfig::default();
        assert_eq!(config.site_origin().unwrap(), "https://www.zeptonow.com");
    }
}

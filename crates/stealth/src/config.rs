//! Profile bundle and per-site policy definitions.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to deserialize profile bundle: {0}")]
    Deserialize(String),
    #[error("profile bundle is invalid: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StealthProfileBundle {
    pub profiles: Vec<StealthProfile>,
    #[serde(default)]
    pub policy: Option<StealthPolicyFile>,
}

impl StealthProfileBundle {
    /// Bundle holding only the built-in desktop profile.
    pub fn builtin() -> Self {
        Self {
            profiles: vec![StealthProfile::desktop_chrome()],
            policy: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profiles.is_empty() {
            return Err(ConfigError::Invalid("bundle declares no profiles".into()));
        }
        if let Some(blank) = self.profiles.iter().find(|p| p.name.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "profile with user agent '{}' has no name",
                blank.user_agent
            )));
        }
        if let Some(policy) = &self.policy {
            let known = |name: &str| self.profiles.iter().any(|p| p.name == name);
            let referenced = std::iter::once(policy.defaults.profile.as_str()).chain(
                policy
                    .sites
                    .iter()
                    .filter_map(|site| site.profile.as_deref()),
            );
            for name in referenced {
                if !known(name) {
                    return Err(ConfigError::Invalid(format!(
                        "policy references unknown profile '{name}'"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StealthProfile {
    pub name: String,
    pub user_agent: String,
    #[serde(default)]
    pub accept_language: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub viewport: Option<Viewport>,
    #[serde(default)]
    pub touch: bool,
}

impl StealthProfile {
    pub const DESKTOP_CHROME: &'static str = "desktop_chrome";

    /// Plain desktop Chrome on Windows at the session's window size.
    pub fn desktop_chrome() -> Self {
        Self {
            name: Self::DESKTOP_CHROME.into(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".into(),
            accept_language: Some("en-IN,en;q=0.9".into()),
            platform: Some("Win32".into()),
            locale: Some("en-IN".into()),
            timezone: Some("Asia/Kolkata".into()),
            viewport: Some(Viewport {
                width: 1366,
                height: 768,
                device_scale_factor: 1.0,
                mobile: false,
            }),
            touch: false,
        }
    }

    /// Primary language tags for `navigator.languages`, parsed from `accept_language`.
    pub fn languages(&self) -> Vec<String> {
        let languages: Vec<String> = self
            .accept_language
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .filter_map(|part| part.split(';').next())
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect();
        if languages.is_empty() {
            vec!["en-US".into(), "en".into()]
        } else {
            languages
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
    #[serde(default)]
    pub mobile: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StealthPolicyFile {
    pub version: u32,
    pub defaults: StealthSitePolicy,
    #[serde(default)]
    pub sites: Vec<StealthSitePolicyEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StealthSitePolicy {
    pub profile: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StealthSitePolicyEntry {
    pub match_pattern: String,
    pub profile: Option<String>,
}

pub fn load_bundle_from_reader<R: Read>(
    mut reader: R,
) -> Result<StealthProfileBundle, ConfigError> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    parse_bundle_str(&buf)
}

pub fn load_bundle_from_path(path: impl AsRef<Path>) -> Result<StealthProfileBundle, ConfigError> {
    let file = File::open(path.as_ref())?;
    load_bundle_from_reader(file)
}

pub fn parse_bundle_str(raw: &str) -> Result<StealthProfileBundle, ConfigError> {
    let bundle: StealthProfileBundle = match serde_json::from_str(raw) {
        Ok(bundle) => bundle,
        Err(json_err) => serde_yaml::from_str(raw).map_err(|yaml_err| {
            ConfigError::Deserialize(format!(
                "json error: {}; yaml error: {}",
                json_err, yaml_err
            ))
        })?,
    };
    bundle.validate()?;
    Ok(bundle)
}

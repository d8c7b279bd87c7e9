//! Anti-detection layer applied to a page before its first navigation.
//!
//! A [`StealthRuntime`] resolves a fingerprint profile per origin from a loaded bundle
//! (or the built-in desktop profile), installs the evasion init script and applies the
//! profile's user agent, timezone, viewport and touch overrides through the CDP adapter.

pub mod config;
pub mod evasion;

use crate::config::{StealthPolicyFile, StealthProfile, StealthProfileBundle};
use async_trait::async_trait;
use cdp_adapter::{ids::PageId as AdapterPageId, Cdp};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Identifier for an applied stealth profile.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ProfileId(pub Uuid);

impl ProfileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProfileId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Error)]
pub enum StealthError {
    #[error("policy denied: {0}")]
    PolicyDenied(String),
    #[error("cdp I/O failure: {0}")]
    CdpIo(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[async_trait]
pub trait StealthControl: Send + Sync {
    /// Choose the profile for `origin` and remember it.
    async fn apply_stealth(&self, origin: &str) -> Result<ProfileId, StealthError>;
    async fn ensure_consistency(&self, origin: &str) -> Result<(), StealthError>;
    /// Push the applied profile for `origin` into `page`.
    async fn configure_page(&self, page: AdapterPageId, origin: &str) -> Result<(), StealthError>;
}

pub struct StealthRuntime {
    applied: DashMap<String, AppliedProfile>,
    profiles: Arc<RwLock<HashMap<String, StealthProfile>>>,
    policy: Arc<RwLock<Option<StealthPolicyFile>>>,
    adapter: Option<Arc<dyn Cdp + Send + Sync>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppliedProfile {
    pub profile_id: ProfileId,
    pub profile_name: String,
}

impl StealthRuntime {
    pub fn new() -> Self {
        Self::with_optional_adapter(None)
    }

    pub fn with_adapter(adapter: Arc<dyn Cdp + Send + Sync>) -> Self {
        Self::with_optional_adapter(Some(adapter))
    }

    fn with_optional_adapter(adapter: Option<Arc<dyn Cdp + Send + Sync>>) -> Self {
        let runtime = Self {
            applied: DashMap::new(),
            profiles: Arc::new(RwLock::new(HashMap::new())),
            policy: Arc::new(RwLock::new(None)),
            adapter,
        };
        runtime.load_bundle(StealthProfileBundle::builtin());
        runtime
    }

    /// Replace the catalog with `bundle`; previously applied origins are forgotten.
    pub fn load_bundle(&self, bundle: StealthProfileBundle) {
        let StealthProfileBundle {
            profiles: profile_defs,
            policy,
        } = bundle;

        {
            let mut profiles = self.profiles.write();
            profiles.clear();
            for profile in profile_defs {
                profiles.insert(profile.name.clone(), profile);
            }
        }
        *self.policy.write() = policy;
        self.applied.clear();
    }

    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn resolve_policy(&self, origin: &str) -> Option<String> {
        let policy_guard = self.policy.read();
        let policy = policy_guard.as_ref()?;
        let mut choice = policy.defaults.profile.clone();
        let mut best_len = 0usize;
        for entry in &policy.sites {
            if pattern_matches(&entry.match_pattern, origin) {
                let len = entry.match_pattern.len();
                if len >= best_len {
                    if let Some(profile) = &entry.profile {
                        choice = profile.clone();
                    }
                    best_len = len;
                }
            }
        }
        Some(choice)
    }

    fn choose_profile(&self, origin: &str) -> Result<AppliedProfile, StealthError> {
        let profiles = self.profiles.read();
        let profile_name = match self.resolve_policy(origin) {
            Some(name) if profiles.contains_key(&name) => name,
            Some(name) => {
                return Err(StealthError::PolicyDenied(format!(
                    "policy selects unknown profile '{name}' for {origin}"
                )))
            }
            None if profiles.contains_key(StealthProfile::DESKTOP_CHROME) => {
                StealthProfile::DESKTOP_CHROME.to_string()
            }
            None => {
                let mut names: Vec<&String> = profiles.keys().collect();
                names.sort();
                names.first().map(|n| n.to_string()).ok_or_else(|| {
                    StealthError::Internal("no stealth profiles loaded".into())
                })?
            }
        };

        Ok(AppliedProfile {
            profile_id: ProfileId::new(),
            profile_name,
        })
    }

    pub fn applied_profile_for(&self, origin: &str) -> Option<AppliedProfile> {
        self.applied.get(origin).map(|entry| entry.value().clone())
    }

    async fn inject_profile(
        &self,
        adapter: &Arc<dyn Cdp + Send + Sync>,
        page: AdapterPageId,
        profile: &StealthProfile,
    ) -> Result<(), StealthError> {
        adapter
            .add_init_script(page, &evasion::evasion_script(profile))
            .await
            .map_err(map_adapter_error)?;

        if !profile.user_agent.is_empty() {
            adapter
                .set_user_agent(
                    page,
                    &profile.user_agent,
                    profile.accept_language.as_deref(),
                    profile.platform.as_deref(),
                    profile.locale.as_deref(),
                )
                .await
                .map_err(map_adapter_error)?;
        }

        if let Some(timezone) = &profile.timezone {
            adapter
                .set_timezone(page, timezone)
                .await
                .map_err(map_adapter_error)?;
        }

        if let Some(viewport) = &profile.viewport {
            adapter
                .set_device_metrics(
                    page,
                    viewport.width,
                    viewport.height,
                    viewport.device_scale_factor,
                    viewport.mobile,
                )
                .await
                .map_err(map_adapter_error)?;
        }

        if profile.touch {
            adapter
                .set_touch_emulation(page, true)
                .await
                .map_err(map_adapter_error)?;
        }

        Ok(())
    }
}

impl Default for StealthRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StealthControl for StealthRuntime {
    async fn apply_stealth(&self, origin: &str) -> Result<ProfileId, StealthError> {
        let applied = self.choose_profile(origin)?;
        let profile_id = applied.profile_id.clone();
        debug!(target: "stealth", %origin, profile = %applied.profile_name, "profile applied");
        self.applied.insert(origin.to_string(), applied);
        Ok(profile_id)
    }

    async fn ensure_consistency(&self, origin: &str) -> Result<(), StealthError> {
        let applied = self.applied.get(origin).ok_or_else(|| {
            StealthError::PolicyDenied(format!("no profile applied for {origin}"))
        })?;
        if self.profiles.read().contains_key(&applied.profile_name) {
            Ok(())
        } else {
            Err(StealthError::Internal(format!(
                "applied profile '{}' no longer loaded",
                applied.profile_name
            )))
        }
    }

    async fn configure_page(&self, page: AdapterPageId, origin: &str) -> Result<(), StealthError> {
        let adapter = self
            .adapter
            .as_ref()
            .ok_or_else(|| StealthError::Internal("stealth adapter not configured".into()))?
            .clone();

        let profile_name = self
            .applied
            .get(origin)
            .map(|entry| entry.profile_name.clone())
            .ok_or_else(|| {
                StealthError::PolicyDenied(format!("no profile applied for {origin}"))
            })?;

        let profile = {
            let profiles = self.profiles.read();
            profiles.get(&profile_name).cloned().ok_or_else(|| {
                StealthError::Internal(format!(
                    "profile '{profile_name}' not found for origin {origin}"
                ))
            })?
        };

        self.inject_profile(&adapter, page, &profile).await?;
        info!(target: "stealth", %origin, profile = %profile_name, "page configured");
        Ok(())
    }
}

fn pattern_matches(pattern: &str, origin: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(idx) = pattern.find('*') {
        let prefix = &pattern[..idx];
        let suffix = &pattern[idx + 1..];
        return origin.len() >= prefix.len() + suffix.len()
            && origin.starts_with(prefix)
            && origin.ends_with(suffix);
    }
    origin == pattern
}

fn map_adapter_error(err: cdp_adapter::AdapterError) -> StealthError {
    let mut hint = err.hint.clone().unwrap_or_default();
    if hint.is_empty() {
        hint = format!("cdp error {:?}", err.kind);
    }
    StealthError::CdpIo(hint)
}

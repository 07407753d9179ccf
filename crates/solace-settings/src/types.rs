//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may be partial; missing fields take their compiled default.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use solace_core::identity::Identity;

use crate::errors::{Result, SettingsError};

/// Root settings for the wellness assistant.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SolaceSettings {
    pub version: String,
    pub provider: ProviderSettings,
    pub connectivity: ConnectivitySettings,
    pub session: SessionSettings,
    pub identity: IdentitySettings,
    pub logging: LoggingSettings,
}

impl Default for SolaceSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            provider: ProviderSettings::default(),
            connectivity: ConnectivitySettings::default(),
            session: SessionSettings::default(),
            identity: IdentitySettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl SolaceSettings {
    /// Reject values that would make the provider unusable.
    pub fn validate(&self) -> Result<()> {
        let p = &self.provider;
        if p.model.trim().is_empty() {
            return Err(SettingsError::InvalidValue("provider.model is empty".into()));
        }
        if !(p.base_url.starts_with("http://") || p.base_url.starts_with("https://")) {
            return Err(SettingsError::InvalidValue(format!(
                "provider.baseUrl must be an http(s) URL, got {:?}",
                p.base_url
            )));
        }
        if p.api_key_env.trim().is_empty() {
            return Err(SettingsError::InvalidValue("provider.apiKeyEnv is empty".into()));
        }
        if p.connect_timeout_ms == 0 || p.idle_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "provider timeouts must be greater than zero".into(),
            ));
        }
        if self.session.turn_deadline_ms == Some(0) {
            return Err(SettingsError::InvalidValue(
                "session.turnDeadlineMs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Hosted model settings. The API key itself is never stored here, only the
/// name of the environment variable it is read from.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSettings {
    pub api_key_env: String,
    pub base_url: String,
    pub model: String,
    pub generation: GenerationSettings,
    /// Gemini harm-block threshold applied to every category.
    pub safety_threshold: String,
    pub connect_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Send only the last N prior messages with each request.
    pub history_window: Option<usize>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key_env: "GEMINI_API_KEY".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-flash".to_string(),
            generation: GenerationSettings::default(),
            safety_threshold: "BLOCK_MEDIUM_AND_ABOVE".to_string(),
            connect_timeout_ms: 30_000,
            idle_timeout_ms: 90_000,
            max_retries: 1,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 5_000,
            history_window: None,
        }
    }
}

impl ProviderSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationSettings {
    pub temperature: f64,
    pub top_k: u32,
    pub top_p: f64,
    pub max_output_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 1024,
        }
    }
}

/// Pre-flight reachability check before each request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectivitySettings {
    pub enabled: bool,
    /// Defaults to the provider base URL's host.
    pub host: Option<String>,
    pub port: Option<u16>,
    pub timeout_ms: u64,
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: None,
            port: None,
            timeout_ms: 3_000,
        }
    }
}

impl ConnectivitySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Fail a turn with `NetworkUnavailable` if it has not completed in time.
    pub turn_deadline_ms: Option<u64>,
}

impl SessionSettings {
    pub fn turn_deadline(&self) -> Option<Duration> {
        self.turn_deadline_ms.map(Duration::from_millis)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentitySettings {
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl IdentitySettings {
    /// A configured display name counts as a signed-in user.
    pub fn to_identity(&self) -> Identity {
        let display_name = self
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from);
        Identity {
            authenticated: display_name.is_some(),
            display_name,
            email: self.email.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    /// Per-module level overrides, e.g. `{"solace_llm": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}

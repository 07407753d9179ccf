//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SolaceSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `SOLACE_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::SolaceSettings;

/// Resolve the path to the settings file (`~/.solace/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".solace").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SolaceSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid value is an error.
pub fn load_settings_from_path(path: &Path) -> Result<SolaceSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<SolaceSettings> {
    let defaults = serde_json::to_value(SolaceSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut SolaceSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from any variable lookup. Invalid values are ignored
/// with a warning and the file/default value is kept.
pub fn apply_overrides_from<F>(settings: &mut SolaceSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Provider ────────────────────────────────────────────────────
    if let Some(v) = env.string("SOLACE_MODEL") {
        settings.provider.model = v;
    }
    if let Some(v) = env.string("SOLACE_BASE_URL") {
        settings.provider.base_url = v;
    }
    if let Some(v) = env.string("SOLACE_API_KEY_ENV") {
        settings.provider.api_key_env = v;
    }
    if let Some(v) = env.parsed("SOLACE_MAX_RETRIES", |s| parse_u32_range(s, 0, 10)) {
        settings.provider.max_retries = v;
    }
    if let Some(v) = env.parsed("SOLACE_HISTORY_WINDOW", |s| parse_usize_range(s, 1, 10_000)) {
        settings.provider.history_window = Some(v);
    }

    // ── Connectivity & session ──────────────────────────────────────
    if let Some(v) = env.parsed("SOLACE_CONNECTIVITY_CHECK", parse_bool) {
        settings.connectivity.enabled = v;
    }
    if let Some(v) = env.parsed("SOLACE_TURN_DEADLINE_MS", |s| parse_u64_range(s, 1, 3_600_000)) {
        settings.session.turn_deadline_ms = Some(v);
    }

    // ── Identity ────────────────────────────────────────────────────
    if let Some(v) = env.string("SOLACE_USER_NAME") {
        settings.identity.display_name = Some(v);
    }
    if let Some(v) = env.string("SOLACE_USER_EMAIL") {
        settings.identity.email = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("SOLACE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("SOLACE_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(val.trim());
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

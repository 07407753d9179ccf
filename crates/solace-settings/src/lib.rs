//! # solace-settings
//!
//! Layered configuration for the wellness assistant:
//! 1. **Compiled defaults** ([`SolaceSettings::default()`])
//! 2. **User file** `~/.solace/settings.json`, deep-merged over defaults
//! 3. **Environment variables** `SOLACE_*` (highest priority)
//!
//! There is no global instance. The binary loads settings once and hands
//! the derived configuration to the components that need it.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

//! # keydeck-settings
//!
//! Runtime configuration for keydeck plugins.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`KeydeckSettings::default()`]
//! 2. **Settings file** — an optional JSON file deep-merged over defaults
//! 3. **Environment variables** — `KEYDECK_*` overrides (highest priority)
//!
//! Nothing here touches the host's own settings storage; per-instance and
//! global plugin settings live in the host and travel over the wire.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
};
pub use types::{ConnectionSettings, DispatcherSettings, KeydeckSettings, LoggingSettings};

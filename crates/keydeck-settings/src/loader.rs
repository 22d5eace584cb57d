//! Layered settings: compiled defaults, then an optional JSON file, then
//! `KEYDECK_*` environment variables, then [`KeydeckSettings::validate`].
//!
//! The file only needs the keys it changes. `null` means "keep the default";
//! arrays replace rather than append.

use std::ops::RangeInclusive;
use std::path::Path;
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::KeydeckSettings;

/// Load settings from an optional file, then apply env overrides.
pub fn load_settings(path: Option<&Path>) -> Result<KeydeckSettings> {
    match path {
        Some(path) => load_settings_from_path(path),
        None => {
            let mut settings = KeydeckSettings::default();
            apply_env_overrides(&mut settings);
            settings.validate()?;
            Ok(settings)
        }
    }
}

/// Load `path` over the defaults, then apply the environment.
///
/// A missing file is not an error; an unreadable or malformed one is.
pub fn load_settings_from_path(path: &Path) -> Result<KeydeckSettings> {
    let defaults = serde_json::to_value(KeydeckSettings::default())?;

    let merged = if path.exists() {
        debug!(path = %path.display(), "reading settings file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        debug!(path = %path.display(), "no settings file, using defaults");
        defaults
    };

    let mut settings: KeydeckSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Overlay `overlay` onto `base`, recursing into objects and skipping nulls.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay.into_iter().filter(|(_, v)| !v.is_null()) {
                let value = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = base.insert(key, value);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut KeydeckSettings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

/// Apply overrides from any key lookup. Bad values are logged and skipped.
pub fn apply_overrides(settings: &mut KeydeckSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    if let Some(v) = env.string("KEYDECK_HOST") {
        settings.connection.host = v;
    }
    if let Some(v) = env.number("KEYDECK_CONNECT_TIMEOUT_MS", 100..=600_000) {
        settings.connection.connect_timeout_ms = v;
    }
    if let Some(v) = env.number("KEYDECK_CLOSE_TIMEOUT_MS", 10..=60_000) {
        settings.connection.close_timeout_ms = v;
    }
    if let Some(v) = env.number("KEYDECK_SEND_QUEUE", 1..=65_536) {
        settings.connection.send_queue_capacity = v;
    }
    if let Some(v) = env.number("KEYDECK_EVENT_CHANNEL", 1..=65_536) {
        settings.connection.event_channel_capacity = v;
    }
    if let Some(v) = env.number("KEYDECK_DRAIN_TIMEOUT_MS", 0..=600_000) {
        settings.dispatcher.drain_timeout_ms = v;
    }
    if let Some(v) = env.bool("KEYDECK_ALERT_ON_FAULT") {
        settings.dispatcher.alert_on_fault = v;
    }
    if let Some(v) = env.string("KEYDECK_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, any case.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a number and accept it only inside `range`.
pub fn parse_in_range<T>(val: &str, range: RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    val.trim().parse().ok().filter(|n| range.contains(n))
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.is_empty())
    }

    fn bool(&self, key: &str) -> Option<bool> {
        let raw = (self.lookup)(key)?;
        let parsed = parse_bool(&raw);
        if parsed.is_none() {
            warn!(key, value = %raw, "ignoring override: expected a boolean");
        }
        parsed
    }

    fn number<T>(&self, key: &str, range: RangeInclusive<T>) -> Option<T>
    where
        T: FromStr + PartialOrd + std::fmt::Display,
    {
        let raw = (self.lookup)(key)?;
        let (min, max) = (range.start().to_string(), range.end().to_string());
        let parsed = parse_in_range(&raw, range);
        if parsed.is_none() {
            warn!(key, value = %raw, %min, %max, "ignoring override: out of range");
        }
        parsed
    }
}

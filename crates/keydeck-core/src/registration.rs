//! Startup registration parameters.
//!
//! The host launches the plugin with four values: the WebSocket port, the
//! plugin's UUID, the name of the registration event, and a JSON `info` blob
//! describing the host and attached devices. They are parsed once and owned
//! for the lifetime of the process.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ids::{DeviceId, PluginUuid};

/// Errors raised while validating registration parameters.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The port was zero.
    #[error("registration port must be non-zero")]
    InvalidPort,
    /// A required string parameter was empty.
    #[error("registration parameter '{0}' must not be empty")]
    Empty(&'static str),
    /// The `info` blob was not valid JSON.
    #[error("registration info is not valid JSON: {0}")]
    InvalidInfo(#[from] serde_json::Error),
}

/// Parameters supplied by the host at process start.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationParameters {
    /// Local WebSocket port the host listens on.
    pub port: u16,
    /// UUID the plugin registers under.
    #[serde(rename = "pluginUUID")]
    pub plugin_uuid: PluginUuid,
    /// Event name of the registration frame (e.g. `registerPlugin`).
    pub register_event: String,
    /// Opaque host/device description.
    #[serde(default)]
    pub info: Value,
}

impl RegistrationParameters {
    /// Build and validate a parameter set.
    pub fn new(
        port: u16,
        plugin_uuid: impl Into<PluginUuid>,
        register_event: impl Into<String>,
        info: Value,
    ) -> Result<Self, RegistrationError> {
        let params = Self {
            port,
            plugin_uuid: plugin_uuid.into(),
            register_event: register_event.into(),
            info,
        };
        params.validate()?;
        Ok(params)
    }

    /// Build from the raw `info` string passed on the command line.
    pub fn from_raw_info(
        port: u16,
        plugin_uuid: impl Into<PluginUuid>,
        register_event: impl Into<String>,
        raw_info: &str,
    ) -> Result<Self, RegistrationError> {
        let info = if raw_info.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(raw_info)?
        };
        Self::new(port, plugin_uuid, register_event, info)
    }

    /// Check the invariants the connection relies on.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.port == 0 {
            return Err(RegistrationError::InvalidPort);
        }
        if self.plugin_uuid.is_empty() {
            return Err(RegistrationError::Empty("pluginUUID"));
        }
        if self.register_event.is_empty() {
            return Err(RegistrationError::Empty("registerEvent"));
        }
        Ok(())
    }

    /// Typed view of `info`. Unknown or missing fields fall back to defaults.
    pub fn info(&self) -> RegistrationInfo {
        serde_json::from_value(self.info.clone()).unwrap_or_default()
    }
}

/// Typed view of the host's `info` blob.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrationInfo {
    /// Host application details.
    pub application: ApplicationInfo,
    /// The plugin as the host sees it.
    pub plugin: PluginInfo,
    /// Devices attached at launch.
    pub devices: Vec<DeviceEntry>,
    /// Pixel ratio of the main display.
    pub device_pixel_ratio: u32,
    /// Theme colors keyed by name.
    pub colors: BTreeMap<String, String>,
}

/// Host application details.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationInfo {
    /// UI language code.
    pub language: String,
    /// `mac` or `windows`.
    pub platform: String,
    /// Operating system version.
    pub platform_version: String,
    /// Host application version.
    pub version: String,
}

/// Plugin identity as reported by the host.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginInfo {
    /// Plugin UUID from the manifest.
    pub uuid: String,
    /// Plugin version from the manifest.
    pub version: String,
}

/// Key grid dimensions of a device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSize {
    /// Number of key columns.
    pub columns: u32,
    /// Number of key rows.
    pub rows: u32,
}

/// One device entry in `info.devices`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Device identifier.
    pub id: DeviceId,
    /// User-visible device name.
    #[serde(default)]
    pub name: String,
    /// Key grid.
    #[serde(default)]
    pub size: DeviceSize,
    /// Numeric device model.
    #[serde(rename = "type", default)]
    pub device_type: u8,
}

//! Inbound event kinds and their payload shapes.

use std::fmt;

use keydeck_core::registration::DeviceSize;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of events the host pushes to the plugin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A monitored application was launched.
    ApplicationDidLaunch,
    /// A monitored application quit.
    ApplicationDidTerminate,
    /// A device was plugged in.
    DeviceDidConnect,
    /// A device was unplugged.
    DeviceDidDisconnect,
    /// Reply to `getGlobalSettings`, or a global settings change.
    DidReceiveGlobalSettings,
    /// Reply to `getSettings`, or an instance settings change.
    DidReceiveSettings,
    /// A key was pressed.
    KeyDown,
    /// A key was released.
    KeyUp,
    /// The property inspector for an instance became visible.
    PropertyInspectorDidAppear,
    /// The property inspector for an instance was hidden.
    PropertyInspectorDidDisappear,
    /// The property inspector sent data to the plugin.
    SendToPlugin,
    /// The computer woke from sleep.
    SystemDidWakeUp,
    /// The user changed an instance's title or title style.
    TitleParametersDidChange,
    /// An action instance became visible.
    WillAppear,
    /// An action instance is going away.
    WillDisappear,
}

impl EventKind {
    /// Every kind, in wire-name order.
    pub const ALL: [Self; 15] = [
        Self::ApplicationDidLaunch,
        Self::ApplicationDidTerminate,
        Self::DeviceDidConnect,
        Self::DeviceDidDisconnect,
        Self::DidReceiveGlobalSettings,
        Self::DidReceiveSettings,
        Self::KeyDown,
        Self::KeyUp,
        Self::PropertyInspectorDidAppear,
        Self::PropertyInspectorDidDisappear,
        Self::SendToPlugin,
        Self::SystemDidWakeUp,
        Self::TitleParametersDidChange,
        Self::WillAppear,
        Self::WillDisappear,
    ];

    /// Wire name of the event.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApplicationDidLaunch => "applicationDidLaunch",
            Self::ApplicationDidTerminate => "applicationDidTerminate",
            Self::DeviceDidConnect => "deviceDidConnect",
            Self::DeviceDidDisconnect => "deviceDidDisconnect",
            Self::DidReceiveGlobalSettings => "didReceiveGlobalSettings",
            Self::DidReceiveSettings => "didReceiveSettings",
            Self::KeyDown => "keyDown",
            Self::KeyUp => "keyUp",
            Self::PropertyInspectorDidAppear => "propertyInspectorDidAppear",
            Self::PropertyInspectorDidDisappear => "propertyInspectorDidDisappear",
            Self::SendToPlugin => "sendToPlugin",
            Self::SystemDidWakeUp => "systemDidWakeUp",
            Self::TitleParametersDidChange => "titleParametersDidChange",
            Self::WillAppear => "willAppear",
            Self::WillDisappear => "willDisappear",
        }
    }

    /// Look up a kind by wire name. Unknown names return `None`.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Whether the event targets a single action instance via its context.
    pub fn is_instance_scoped(self) -> bool {
        matches!(
            self,
            Self::DidReceiveSettings
                | Self::KeyDown
                | Self::KeyUp
                | Self::PropertyInspectorDidAppear
                | Self::PropertyInspectorDidDisappear
                | Self::SendToPlugin
                | Self::TitleParametersDidChange
                | Self::WillAppear
                | Self::WillDisappear
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Position of a key on the device grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Zero-based column.
    pub column: u32,
    /// Zero-based row.
    pub row: u32,
}

/// Payload of `keyDown` / `keyUp`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPayload {
    /// Persisted instance settings.
    #[serde(default = "empty_object")]
    pub settings: Value,
    /// Key position; absent inside multi-actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    /// Current state for multi-state actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<u32>,
    /// State requested by a multi-action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_desired_state: Option<u32>,
    /// Whether the key is part of a multi-action.
    #[serde(default)]
    pub is_in_multi_action: bool,
}

/// Payload of `willAppear` / `willDisappear`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppearancePayload {
    /// Persisted instance settings.
    #[serde(default = "empty_object")]
    pub settings: Value,
    /// Key position; absent inside multi-actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    /// Current state for multi-state actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<u32>,
    /// Whether the instance is part of a multi-action.
    #[serde(default)]
    pub is_in_multi_action: bool,
    /// Controller type (`Keypad`, `Encoder`) on hosts that report it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
}

/// Payload of `didReceiveSettings`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPayload {
    /// Persisted instance settings.
    #[serde(default = "empty_object")]
    pub settings: Value,
    /// Key position; absent inside multi-actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    /// Current state for multi-state actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<u32>,
    /// Whether the instance is part of a multi-action.
    #[serde(default)]
    pub is_in_multi_action: bool,
}

/// Payload of `didReceiveGlobalSettings`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalSettingsPayload {
    /// Persisted plugin-wide settings.
    #[serde(default = "empty_object")]
    pub settings: Value,
}

/// Title styling reported by `titleParametersDidChange`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TitleParameters {
    /// Font family name.
    pub font_family: String,
    /// Font size in points.
    pub font_size: u32,
    /// Font style (`Regular`, `Bold`, ...).
    pub font_style: String,
    /// Whether the title is underlined.
    pub font_underline: bool,
    /// Whether the title is shown at all.
    pub show_title: bool,
    /// `top`, `middle` or `bottom`.
    pub title_alignment: String,
    /// Color as `#RRGGBB`.
    pub title_color: String,
}

/// Payload of `titleParametersDidChange`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleParametersPayload {
    /// Persisted instance settings.
    #[serde(default = "empty_object")]
    pub settings: Value,
    /// Key position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    /// Current state.
    #[serde(default)]
    pub state: u32,
    /// The new title.
    #[serde(default)]
    pub title: String,
    /// The new title styling.
    #[serde(default)]
    pub title_parameters: TitleParameters,
}

/// Payload of `applicationDidLaunch` / `applicationDidTerminate`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationPayload {
    /// Bundle identifier or executable name.
    pub application: String,
}

/// `deviceInfo` of `deviceDidConnect`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// User-visible device name.
    #[serde(default)]
    pub name: String,
    /// Numeric device model.
    #[serde(rename = "type", default)]
    pub device_type: u8,
    /// Key grid.
    #[serde(default)]
    pub size: DeviceSize,
}

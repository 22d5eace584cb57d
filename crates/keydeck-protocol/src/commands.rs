//! Outbound commands and their fixed payload shapes.

use std::fmt;

use keydeck_core::ids::{ActionUuid, ContextId, DeviceId};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Which surface a title or image update applies to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Target {
    /// Both the physical key and the software preview.
    #[default]
    Both = 0,
    /// The physical key only.
    Hardware = 1,
    /// The software preview only.
    Software = 2,
}

impl Target {
    /// Numeric wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Target {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Both),
            1 => Ok(Self::Hardware),
            2 => Ok(Self::Software),
            other => Err(other),
        }
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        Self::try_from(raw)
            .map_err(|v| serde::de::Error::custom(format!("unknown target value {v}")))
    }
}

/// Wire names of outbound commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Persist instance settings.
    SetSettings,
    /// Request instance settings.
    GetSettings,
    /// Persist plugin-wide settings.
    SetGlobalSettings,
    /// Request plugin-wide settings.
    GetGlobalSettings,
    /// Open a URL in the default browser.
    OpenUrl,
    /// Write a line to the host's plugin log.
    LogMessage,
    /// Change an instance's title.
    SetTitle,
    /// Change an instance's image.
    SetImage,
    /// Flash the alert glyph on a key.
    ShowAlert,
    /// Flash the OK glyph on a key.
    ShowOk,
    /// Switch a multi-state action's state.
    SetState,
    /// Switch a device to a bundled profile.
    SwitchToProfile,
    /// Send data to an instance's property inspector.
    SendToPropertyInspector,
}

impl CommandKind {
    /// Wire name of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SetSettings => "setSettings",
            Self::GetSettings => "getSettings",
            Self::SetGlobalSettings => "setGlobalSettings",
            Self::GetGlobalSettings => "getGlobalSettings",
            Self::OpenUrl => "openUrl",
            Self::LogMessage => "logMessage",
            Self::SetTitle => "setTitle",
            Self::SetImage => "setImage",
            Self::ShowAlert => "showAlert",
            Self::ShowOk => "showOk",
            Self::SetState => "setState",
            Self::SwitchToProfile => "switchToProfile",
            Self::SendToPropertyInspector => "sendToPropertyInspector",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command the plugin sends to the host.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Persist settings for an instance.
    SetSettings {
        /// Target instance.
        context: ContextId,
        /// Settings object to store.
        settings: Value,
    },
    /// Ask the host to replay an instance's settings via `didReceiveSettings`.
    GetSettings {
        /// Target instance.
        context: ContextId,
    },
    /// Persist plugin-wide settings. `context` is the plugin UUID.
    SetGlobalSettings {
        /// The plugin UUID.
        context: ContextId,
        /// Settings object to store.
        settings: Value,
    },
    /// Ask the host to replay plugin-wide settings via `didReceiveGlobalSettings`.
    GetGlobalSettings {
        /// The plugin UUID.
        context: ContextId,
    },
    /// Open a URL in the default browser.
    OpenUrl {
        /// The URL.
        url: String,
    },
    /// Write a line to the host's plugin log.
    LogMessage {
        /// The line.
        message: String,
    },
    /// Change an instance's title. `None` restores the user-defined title.
    SetTitle {
        /// Target instance.
        context: ContextId,
        /// New title.
        title: Option<String>,
        /// Which surface to update.
        target: Target,
        /// State to update; `None` updates all states.
        state: Option<u32>,
    },
    /// Change an instance's image (base64 data URI or SVG). `None` restores the default.
    SetImage {
        /// Target instance.
        context: ContextId,
        /// New image.
        image: Option<String>,
        /// Which surface to update.
        target: Target,
        /// State to update; `None` updates all states.
        state: Option<u32>,
    },
    /// Flash the alert glyph.
    ShowAlert {
        /// Target instance.
        context: ContextId,
    },
    /// Flash the OK glyph.
    ShowOk {
        /// Target instance.
        context: ContextId,
    },
    /// Switch a multi-state action to a state.
    SetState {
        /// Target instance.
        context: ContextId,
        /// Zero-based state index.
        state: u32,
    },
    /// Switch a device to a profile bundled with the plugin. `context` is the plugin UUID.
    SwitchToProfile {
        /// The plugin UUID.
        context: ContextId,
        /// Device to switch.
        device: DeviceId,
        /// Profile name; `None` switches back to the previous profile.
        profile: Option<String>,
    },
    /// Send arbitrary data to an instance's property inspector.
    SendToPropertyInspector {
        /// Target instance.
        context: ContextId,
        /// Action type of the instance.
        action: ActionUuid,
        /// Data to deliver.
        payload: Value,
    },
}

impl Command {
    /// The wire name of this command.
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::SetSettings { .. } => CommandKind::SetSettings,
            Self::GetSettings { .. } => CommandKind::GetSettings,
            Self::SetGlobalSettings { .. } => CommandKind::SetGlobalSettings,
            Self::GetGlobalSettings { .. } => CommandKind::GetGlobalSettings,
            Self::OpenUrl { .. } => CommandKind::OpenUrl,
            Self::LogMessage { .. } => CommandKind::LogMessage,
            Self::SetTitle { .. } => CommandKind::SetTitle,
            Self::SetImage { .. } => CommandKind::SetImage,
            Self::ShowAlert { .. } => CommandKind::ShowAlert,
            Self::ShowOk { .. } => CommandKind::ShowOk,
            Self::SetState { .. } => CommandKind::SetState,
            Self::SwitchToProfile { .. } => CommandKind::SwitchToProfile,
            Self::SendToPropertyInspector { .. } => CommandKind::SendToPropertyInspector,
        }
    }

    /// The context the command is addressed to, if any.
    pub fn context(&self) -> Option<&ContextId> {
        match self {
            Self::OpenUrl { .. } | Self::LogMessage { .. } => None,
            Self::SetSettings { context, .. }
            | Self::GetSettings { context }
            | Self::SetGlobalSettings { context, .. }
            | Self::GetGlobalSettings { context }
            | Self::SetTitle { context, .. }
            | Self::SetImage { context, .. }
            | Self::ShowAlert { context }
            | Self::ShowOk { context }
            | Self::SetState { context, .. }
            | Self::SwitchToProfile { context, .. }
            | Self::SendToPropertyInspector { context, .. } => Some(context),
        }
    }

    /// Shorthand for a `logMessage` command.
    pub fn log(message: impl Into<String>) -> Self {
        Self::LogMessage {
            message: message.into(),
        }
    }

    /// Shorthand for a `showAlert` command.
    pub fn alert(context: impl Into<ContextId>) -> Self {
        Self::ShowAlert {
            context: context.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_serializes_numerically() {
        assert_eq!(serde_json::to_string(&Target::Both).unwrap(), "0");
        assert_eq!(serde_json::to_string(&Target::Hardware).unwrap(), "1");
        assert_eq!(serde_json::to_string(&Target::Software).unwrap(), "2");
    }

    #[test]
    fn target_rejects_unknown_value() {
        assert!(serde_json::from_str::<Target>("7").is_err());
        assert_eq!(serde_json::from_str::<Target>("2").unwrap(), Target::Software);
    }

    #[test]
    fn context_extraction() {
        assert!(Command::log("hi").context().is_none());
        let cmd = Command::alert("ctx1");
        assert_eq!(cmd.context().map(ContextId::as_str), Some("ctx1"));
        assert_eq!(cmd.kind(), CommandKind::ShowAlert);
    }
}

//! Frame encoding and decoding.
//!
//! Outbound frames serialize as `{context?, action?, device?, payload?, event}`
//! with absent fields omitted. Inbound frames are read event-first: an
//! unrecognized `event` name is reported as [`Decoded::Unrecognized`] rather
//! than an error so the receive loop can log and move on.

use keydeck_core::ids::{ActionUuid, ContextId, DeviceId, PluginUuid};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::commands::{Command, Target};
use crate::errors::CodecError;
use crate::events::EventKind;

#[derive(Serialize)]
struct OutboundEnvelope<'a, P: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<P>,
    event: &'static str,
}

#[derive(Serialize)]
struct RegistrationFrame<'a> {
    event: &'a str,
    uuid: &'a str,
}

#[derive(Serialize)]
struct TitlePayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<u32>,
    target: Target,
}

#[derive(Serialize)]
struct ImagePayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<u32>,
    target: Target,
}

#[derive(Serialize)]
struct StatePayload {
    state: u32,
}

#[derive(Serialize)]
struct ProfilePayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<&'a str>,
}

#[derive(Serialize)]
struct UrlPayload<'a> {
    url: &'a str,
}

#[derive(Serialize)]
struct MessagePayload<'a> {
    message: &'a str,
}

/// Addressing fields of an outbound frame.
#[derive(Default)]
struct Address<'a> {
    context: Option<&'a str>,
    action: Option<&'a str>,
    device: Option<&'a str>,
}

impl<'a> Address<'a> {
    fn context(context: &'a ContextId) -> Self {
        Self {
            context: non_empty(context.as_str()),
            ..Self::default()
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

fn write_frame<P: Serialize>(
    event: &'static str,
    address: Address<'_>,
    payload: Option<P>,
) -> Result<String, CodecError> {
    let envelope = OutboundEnvelope {
        context: address.context,
        action: address.action,
        device: address.device,
        payload,
        event,
    };
    serde_json::to_string(&envelope).map_err(|source| CodecError::Encode {
        event: event.to_owned(),
        source,
    })
}

/// Encode a command as one compact JSON frame.
pub fn encode(command: &Command) -> Result<String, CodecError> {
    let event = command.kind().as_str();
    match command {
        Command::SetSettings { context, settings }
        | Command::SetGlobalSettings { context, settings } => {
            write_frame(event, Address::context(context), Some(settings))
        }
        Command::GetSettings { context }
        | Command::GetGlobalSettings { context }
        | Command::ShowAlert { context }
        | Command::ShowOk { context } => {
            write_frame(event, Address::context(context), None::<()>)
        }
        Command::OpenUrl { url } => write_frame(event, Address::default(), Some(UrlPayload { url })),
        Command::LogMessage { message } => write_frame(
            event,
            Address::default(),
            Some(MessagePayload { message }),
        ),
        Command::SetTitle {
            context,
            title,
            target,
            state,
        } => write_frame(
            event,
            Address::context(context),
            Some(TitlePayload {
                title: title.as_deref(),
                state: *state,
                target: *target,
            }),
        ),
        Command::SetImage {
            context,
            image,
            target,
            state,
        } => write_frame(
            event,
            Address::context(context),
            Some(ImagePayload {
                image: image.as_deref(),
                state: *state,
                target: *target,
            }),
        ),
        Command::SetState { context, state } => write_frame(
            event,
            Address::context(context),
            Some(StatePayload { state: *state }),
        ),
        Command::SwitchToProfile {
            context,
            device,
            profile,
        } => write_frame(
            event,
            Address {
                context: non_empty(context.as_str()),
                device: non_empty(device.as_str()),
                ..Address::default()
            },
            Some(ProfilePayload {
                profile: profile.as_deref(),
            }),
        ),
        Command::SendToPropertyInspector {
            context,
            action,
            payload,
        } => write_frame(
            event,
            Address {
                context: non_empty(context.as_str()),
                action: non_empty(action.as_str()),
                ..Address::default()
            },
            Some(payload),
        ),
    }
}

/// Encode the registration frame sent once right after the transport opens.
pub fn encode_registration(
    register_event: &str,
    plugin_uuid: &PluginUuid,
) -> Result<String, CodecError> {
    serde_json::to_string(&RegistrationFrame {
        event: register_event,
        uuid: plugin_uuid.as_str(),
    })
    .map_err(|source| CodecError::Encode {
        event: register_event.to_owned(),
        source,
    })
}

#[derive(Deserialize)]
struct InboundEnvelope {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    device: Option<String>,
    #[serde(default)]
    payload: Option<Box<RawValue>>,
    #[serde(default, rename = "deviceInfo")]
    device_info: Option<Box<RawValue>>,
}

/// A recognized inbound event with its payload still in raw form.
#[derive(Clone, Debug)]
pub struct InboundEvent {
    /// Which event this is.
    pub kind: EventKind,
    /// Instance context, when the event is instance-scoped.
    pub context: Option<ContextId>,
    /// Action type of the instance.
    pub action: Option<ActionUuid>,
    /// Device the event originated on.
    pub device: Option<DeviceId>,
    payload: Option<Box<RawValue>>,
}

impl InboundEvent {
    /// An event with no addressing and no payload.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            context: None,
            action: None,
            device: None,
            payload: None,
        }
    }

    /// Set the instance context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<ContextId>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Set the action type.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<ActionUuid>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Set the device.
    #[must_use]
    pub fn with_device(mut self, device: impl Into<DeviceId>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Attach a payload serialized from `value`.
    pub fn with_payload<T: Serialize>(mut self, value: &T) -> Result<Self, CodecError> {
        let raw = serde_json::value::to_raw_value(value).map_err(|source| CodecError::Encode {
            event: self.kind.as_str().to_owned(),
            source,
        })?;
        self.payload = Some(raw);
        Ok(self)
    }

    /// The payload exactly as received.
    pub fn raw_payload(&self) -> Option<&RawValue> {
        self.payload.as_deref()
    }

    /// Deserialize the payload into the shape expected for this event.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        let raw = self
            .payload
            .as_deref()
            .ok_or(CodecError::MissingPayload(self.kind))?;
        serde_json::from_str(raw.get()).map_err(|source| CodecError::InvalidPayload {
            kind: self.kind,
            source,
        })
    }
}

/// Result of decoding one inbound frame.
#[derive(Clone, Debug)]
pub enum Decoded {
    /// A recognized event.
    Event(InboundEvent),
    /// A well-formed frame whose `event` name is not in the known set.
    Unrecognized(String),
}

/// Decode one inbound frame.
pub fn decode(text: &str) -> Result<Decoded, CodecError> {
    let envelope: InboundEnvelope = serde_json::from_str(text).map_err(CodecError::Malformed)?;
    let name = envelope.event.ok_or(CodecError::MissingEvent)?;
    let Some(kind) = EventKind::from_wire(&name) else {
        return Ok(Decoded::Unrecognized(name));
    };

    // deviceDidConnect carries its payload under `deviceInfo`
    let payload = match kind {
        EventKind::DeviceDidConnect => envelope.device_info.or(envelope.payload),
        _ => envelope.payload,
    };

    Ok(Decoded::Event(InboundEvent {
        kind,
        context: envelope.context.filter(|c| !c.is_empty()).map(ContextId::from),
        action: envelope.action.filter(|a| !a.is_empty()).map(ActionUuid::from),
        device: envelope.device.filter(|d| !d.is_empty()).map(DeviceId::from),
        payload,
    }))
}

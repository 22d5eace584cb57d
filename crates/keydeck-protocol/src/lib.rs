//! # keydeck-protocol
//!
//! Pure, stateless transformation between protocol messages and JSON text.
//! Nothing here performs I/O.
//!
//! - [`events`]: the closed set of inbound [`EventKind`]s and their payloads
//! - [`commands`]: outbound [`Command`]s with their fixed payload shapes
//! - [`codec`]: [`encode`], [`encode_registration`] and [`decode`]
//!
//! Payloads of inbound events stay raw until a handler asks for them, so
//! events nobody listens to are never fully deserialized.

#![deny(unsafe_code)]

pub mod codec;
pub mod commands;
pub mod errors;
pub mod events;

pub use codec::{Decoded, InboundEvent, decode, encode, encode_registration};
pub use commands::{Command, CommandKind, Target};
pub use errors::CodecError;
pub use events::{
    AppearancePayload, ApplicationPayload, Coordinates, DeviceInfo, EventKind,
    GlobalSettingsPayload, KeyPayload, SettingsPayload, TitleParameters, TitleParametersPayload,
};

//! # keydeck-core
//!
//! Foundation types shared by every keydeck crate:
//!
//! - **Opaque IDs**: `ContextId`, `ActionUuid`, `DeviceId`, `PluginUuid` as
//!   newtypes over the strings the host application hands out
//! - **Registration**: `RegistrationParameters` supplied at process start, plus
//!   a typed view of the host's `info` blob
//! - **Logging**: `tracing` subscriber setup and in-memory capture for tests

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod registration;

pub use ids::{ActionUuid, ContextId, DeviceId, PluginUuid};
pub use registration::{RegistrationError, RegistrationInfo, RegistrationParameters};

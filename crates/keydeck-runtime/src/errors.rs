//! Runtime error types.

use std::time::Duration;

use keydeck_core::{ActionUuid, ContextId, RegistrationError};
use keydeck_protocol::CodecError;
use tokio_tungstenite::tungstenite;

use crate::connection::ConnectionState;

/// Errors raised by the WebSocket session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The startup parameters failed validation.
    #[error("Invalid registration parameters: {0}")]
    Registration(#[from] RegistrationError),

    /// `connect()` was called on a session that already left `Idle`.
    #[error("Connection already started (state: {0})")]
    AlreadyStarted(ConnectionState),

    /// A command was issued while the session was not `Open`.
    #[error("Connection is not open (state: {0})")]
    NotOpen(ConnectionState),

    /// Opening the transport took longer than the configured bound.
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The underlying WebSocket failed.
    #[error("Transport error: {0}")]
    Transport(#[source] Box<tungstenite::Error>),

    /// The command could not be encoded.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The writer task is gone; the session has ended.
    #[error("Connection writer closed")]
    WriterClosed,

    /// The caller's cancellation token fired before the write completed.
    #[error("Send cancelled")]
    Cancelled,
}

impl From<tungstenite::Error> for ConnectionError {
    fn from(err: tungstenite::Error) -> Self {
        Self::Transport(Box::new(err))
    }
}

impl ConnectionError {
    /// Whether the error came from the caller rather than the transport.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::Registration(_) | Self::AlreadyStarted(_) | Self::NotOpen(_)
        )
    }
}

/// Errors returned by [`Dispatcher::invoke`](crate::Dispatcher::invoke).
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The dispatcher has been drained and accepts no more work.
    #[error("Dispatcher drained, refusing new work")]
    Drained,
}

/// Errors raised while building the action router.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// A factory was already registered for this action UUID.
    #[error("Action already registered: {0}")]
    DuplicateAction(ActionUuid),

    /// The action UUID was empty.
    #[error("Action UUID must not be empty")]
    EmptyAction,
}

/// Errors returned by an instance's command handle.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The instance saw `willDisappear`; its context is no longer valid.
    #[error("Context disposed: {0}")]
    Disposed(ContextId),

    /// The command names a context the host never showed us, or one that
    /// has since disappeared.
    #[error("Unknown context: {0}")]
    UnknownContext(ContextId),

    /// The connection refused or failed the write.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Errors returned from handler code.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A command failed.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The event payload did not have the expected shape.
    #[error(transparent)]
    Payload(#[from] CodecError),

    /// The handler (or an action factory) panicked.
    #[error("Panicked: {0}")]
    Panicked(String),

    /// Anything else the handler wants to report.
    #[error("{0}")]
    Message(String),
}

impl HandlerError {
    /// Build a free-form handler error.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

impl From<ConnectionError> for HandlerError {
    fn from(err: ConnectionError) -> Self {
        Self::Command(CommandError::Connection(err))
    }
}

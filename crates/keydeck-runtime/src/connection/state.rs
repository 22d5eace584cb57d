//! Session lifecycle states.

use std::fmt;

/// Where a [`Connection`](super::Connection) is in its lifecycle.
///
/// `Idle → Connecting → Open → Closing → Closed`, with `Faulted` reachable
/// from any non-terminal state when the transport fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Created, `connect()` not called yet.
    Idle,
    /// Opening the socket and sending the registration frame.
    Connecting,
    /// Registered; events flow and commands may be sent.
    Open,
    /// `disconnect()` in progress; sends are refused.
    Closing,
    /// Closed cleanly.
    Closed,
    /// The transport failed. Terminal; the session does not self-heal.
    Faulted,
}

impl ConnectionState {
    /// Whether no further transitions can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Faulted)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::{Closed, Closing, Connecting, Faulted, Idle, Open};
        match (self, next) {
            (Idle, Connecting | Closed)
            | (Connecting, Open | Closed)
            | (Open, Closing | Closed)
            | (Closing, Closed) => true,
            (from, Faulted) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Lowercase name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Faulted => "faulted",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

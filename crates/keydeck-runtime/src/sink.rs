//! The seam through which everything above the connection sends commands.

use async_trait::async_trait;
use keydeck_protocol::Command;
use tokio_util::sync::CancellationToken;

use crate::errors::ConnectionError;

/// Anything that can deliver an outbound [`Command`] to the host.
///
/// [`Connection`](crate::Connection) is the production implementation;
/// tests use [`RecordingSink`](crate::testutil::RecordingSink).
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Encode and write one command.
    async fn send(&self, command: Command) -> Result<(), ConnectionError>;

    /// Like [`send`](Self::send), but gives up when `token` fires first.
    async fn send_cancellable(
        &self,
        command: Command,
        token: &CancellationToken,
    ) -> Result<(), ConnectionError> {
        tokio::select! {
            biased;
            () = token.cancelled() => Err(ConnectionError::Cancelled),
            result = self.send(command) => result,
        }
    }
}

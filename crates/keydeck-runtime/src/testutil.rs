//! Test helpers shared by unit tests, integration tests and downstream crates.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use keydeck_protocol::{Command, CommandKind};
use parking_lot::Mutex;

use crate::errors::ConnectionError;
use crate::sink::CommandSink;

/// A [`CommandSink`] that records every command instead of writing it.
#[derive(Clone, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<Command>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail with [`ConnectionError::WriterClosed`].
    pub fn fail_sends(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Everything sent so far, in order.
    pub fn commands(&self) -> Vec<Command> {
        self.sent.lock().clone()
    }

    /// Number of commands of the given kind.
    pub fn count(&self, kind: CommandKind) -> usize {
        self.sent.lock().iter().filter(|c| c.kind() == kind).count()
    }

    /// Messages of every `logMessage` command.
    pub fn log_messages(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|c| match c {
                Command::LogMessage { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget everything recorded.
    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl CommandSink for RecordingSink {
    async fn send(&self, command: Command) -> Result<(), ConnectionError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ConnectionError::WriterClosed);
        }
        self.sent.lock().push(command);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn records_in_order() {
        let sink = RecordingSink::new();
        sink.send(Command::log("one")).await.unwrap();
        sink.send(Command::alert("ctx1")).await.unwrap();
        assert_eq!(sink.count(CommandKind::LogMessage), 1);
        assert_eq!(sink.count(CommandKind::ShowAlert), 1);
        assert_eq!(sink.log_messages(), vec!["one".to_string()]);
    }

    #[tokio::test]
    async fn failing_sink_rejects() {
        let sink = RecordingSink::new();
        sink.fail_sends(true);
        assert!(sink.send(Command::log("x")).await.is_err());
        assert!(sink.commands().is_empty());
    }

    #[tokio::test]
    async fn cancelled_token_wins() {
        let sink = RecordingSink::new();
        let token = CancellationToken::new();
        token.cancel();
        let result = sink.send_cancellable(Command::log("x"), &token).await;
        assert!(matches!(result, Err(ConnectionError::Cancelled)));
        assert!(sink.commands().is_empty());
    }
}

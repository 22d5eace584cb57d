//! Action instances: the handler trait and the per-instance command handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use keydeck_core::logging::instance_span;
use keydeck_core::{ActionUuid, ContextId, DeviceId};
use keydeck_protocol::{
    AppearancePayload, Command, KeyPayload, SettingsPayload, Target, TitleParametersPayload,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::errors::{CommandError, HandlerError};
use crate::sink::CommandSink;

/// Result type returned by handler methods.
pub type HandlerResult = Result<(), HandlerError>;

/// Behavior of one kind of action.
///
/// One value is constructed per visible instance by the factory passed to
/// [`RouterBuilder::map_action`](crate::RouterBuilder::map_action). Methods
/// take `&self` and may run concurrently with each other, even for the same
/// instance; keep mutable state behind a lock or an atomic.
///
/// Every method defaults to doing nothing.
#[async_trait]
#[allow(unused_variables)]
pub trait Action: Send + Sync + 'static {
    /// The instance became visible. Called again on a duplicate `willAppear`.
    async fn on_will_appear(&self, cx: &ActionContext, payload: AppearancePayload) -> HandlerResult {
        Ok(())
    }

    /// The instance is going away.
    ///
    /// The handle is disposed as soon as this call is scheduled, so
    /// commands sent through `cx` fail with [`CommandError::Disposed`].
    async fn on_will_disappear(
        &self,
        cx: &ActionContext,
        payload: AppearancePayload,
    ) -> HandlerResult {
        Ok(())
    }

    /// A key was pressed.
    async fn on_key_down(&self, cx: &ActionContext, payload: KeyPayload) -> HandlerResult {
        Ok(())
    }

    /// A key was released.
    async fn on_key_up(&self, cx: &ActionContext, payload: KeyPayload) -> HandlerResult {
        Ok(())
    }

    /// The host delivered this instance's persisted settings.
    async fn on_did_receive_settings(
        &self,
        cx: &ActionContext,
        payload: SettingsPayload,
    ) -> HandlerResult {
        Ok(())
    }

    /// The property inspector for this instance opened.
    async fn on_property_inspector_did_appear(&self, cx: &ActionContext) -> HandlerResult {
        Ok(())
    }

    /// The property inspector for this instance closed.
    async fn on_property_inspector_did_disappear(&self, cx: &ActionContext) -> HandlerResult {
        Ok(())
    }

    /// The property inspector sent data to the plugin.
    ///
    /// An event without a payload never gets here; it is reported as a
    /// handler fault like any other undecodable payload.
    async fn on_send_to_plugin(&self, cx: &ActionContext, payload: Value) -> HandlerResult {
        Ok(())
    }

    /// The user changed title parameters in the host UI.
    async fn on_title_parameters_did_change(
        &self,
        cx: &ActionContext,
        payload: TitleParametersPayload,
    ) -> HandlerResult {
        Ok(())
    }
}

struct Handle {
    action: ActionUuid,
    context: ContextId,
    device: Option<DeviceId>,
    sink: Arc<dyn CommandSink>,
    disposed: AtomicBool,
    span: Span,
    cancel: CancellationToken,
}

/// What an action instance gets instead of the connection: its identity, a
/// logger span and a command handle scoped to its own context.
///
/// Once the instance has seen `willDisappear` the handle is disposed and
/// every command returns [`CommandError::Disposed`].
#[derive(Clone)]
pub struct ActionContext {
    handle: Arc<Handle>,
}

impl ActionContext {
    /// Build a handle for one instance.
    pub fn new(
        action: ActionUuid,
        context: ContextId,
        device: Option<DeviceId>,
        sink: Arc<dyn CommandSink>,
        cancel: CancellationToken,
    ) -> Self {
        let span = instance_span(action.as_str(), context.as_str());
        Self {
            handle: Arc::new(Handle {
                action,
                context,
                device,
                sink,
                disposed: AtomicBool::new(false),
                span,
                cancel,
            }),
        }
    }

    /// Action type of this instance.
    pub fn action(&self) -> &ActionUuid {
        &self.handle.action
    }

    /// Opaque context of this instance.
    pub fn context(&self) -> &ContextId {
        &self.handle.context
    }

    /// Device the instance appeared on, when the host said.
    pub fn device(&self) -> Option<&DeviceId> {
        self.handle.device.as_ref()
    }

    /// Logger span carrying `action` and `context`.
    pub fn span(&self) -> &Span {
        &self.handle.span
    }

    /// Fires when the plugin is shutting down. Handlers may watch it to
    /// stop early; nothing forces them to.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.handle.cancel
    }

    /// Whether the instance has disappeared.
    pub fn is_disposed(&self) -> bool {
        self.handle.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn dispose(&self) {
        self.handle.disposed.store(true, Ordering::Release);
    }

    /// A disposed handle refuses everything. A live one only sends commands
    /// addressed to its own context, or to no context at all.
    fn check(&self, command: &Command) -> Result<(), CommandError> {
        if self.is_disposed() {
            return Err(CommandError::Disposed(self.handle.context.clone()));
        }
        match command.context() {
            Some(target) if *target != self.handle.context => {
                Err(CommandError::UnknownContext(target.clone()))
            }
            _ => Ok(()),
        }
    }

    /// Send any command through this instance's handle.
    pub async fn send(&self, command: Command) -> Result<(), CommandError> {
        self.check(&command)?;
        self.handle.sink.send(command).await?;
        Ok(())
    }

    /// Send a command, giving up if `token` fires first.
    pub async fn send_cancellable(
        &self,
        command: Command,
        token: &CancellationToken,
    ) -> Result<(), CommandError> {
        self.check(&command)?;
        self.handle.sink.send_cancellable(command, token).await?;
        Ok(())
    }

    /// Set the title on both hardware and software, for all states.
    pub async fn set_title(&self, title: impl Into<String>) -> Result<(), CommandError> {
        self.send(Command::SetTitle {
            context: self.context().clone(),
            title: Some(title.into()),
            target: Target::Both,
            state: None,
        })
        .await
    }

    /// Set the title with full control. `None` restores the user's title.
    pub async fn set_title_with(
        &self,
        title: Option<String>,
        target: Target,
        state: Option<u32>,
    ) -> Result<(), CommandError> {
        self.send(Command::SetTitle {
            context: self.context().clone(),
            title,
            target,
            state,
        })
        .await
    }

    /// Set the image. `None` restores the manifest image.
    pub async fn set_image(
        &self,
        image: Option<String>,
        target: Target,
        state: Option<u32>,
    ) -> Result<(), CommandError> {
        self.send(Command::SetImage {
            context: self.context().clone(),
            image,
            target,
            state,
        })
        .await
    }

    /// Switch to a state of a multi-state action.
    pub async fn set_state(&self, state: u32) -> Result<(), CommandError> {
        self.send(Command::SetState {
            context: self.context().clone(),
            state,
        })
        .await
    }

    /// Flash the alert glyph.
    pub async fn show_alert(&self) -> Result<(), CommandError> {
        self.send(Command::alert(self.context().clone())).await
    }

    /// Flash the OK glyph.
    pub async fn show_ok(&self) -> Result<(), CommandError> {
        self.send(Command::ShowOk {
            context: self.context().clone(),
        })
        .await
    }

    /// Persist settings for this instance.
    pub async fn set_settings(&self, settings: Value) -> Result<(), CommandError> {
        self.send(Command::SetSettings {
            context: self.context().clone(),
            settings,
        })
        .await
    }

    /// Ask the host for this instance's settings.
    pub async fn get_settings(&self) -> Result<(), CommandError> {
        self.send(Command::GetSettings {
            context: self.context().clone(),
        })
        .await
    }

    /// Send data to this instance's property inspector.
    pub async fn send_to_property_inspector(&self, payload: Value) -> Result<(), CommandError> {
        self.send(Command::SendToPropertyInspector {
            context: self.context().clone(),
            action: self.action().clone(),
            payload,
        })
        .await
    }

    /// Write a line to the host's plugin log.
    pub async fn log_message(&self, message: impl Into<String>) -> Result<(), CommandError> {
        self.send(Command::log(message)).await
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("action", &self.handle.action)
            .field("context", &self.handle.context)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RecordingSink;
    use assert_matches::assert_matches;
    use keydeck_protocol::CommandKind;

    fn context(sink: &RecordingSink) -> ActionContext {
        ActionContext::new(
            ActionUuid::new("com.example.counter"),
            ContextId::new("ctx1"),
            Some(DeviceId::new("dev1")),
            Arc::new(sink.clone()),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn helpers_address_own_context() {
        let sink = RecordingSink::new();
        let cx = context(&sink);
        cx.set_title("3").await.unwrap();
        cx.show_ok().await.unwrap();
        cx.send_to_property_inspector(serde_json::json!({"n": 3}))
            .await
            .unwrap();

        let commands = sink.commands();
        assert_eq!(commands.len(), 3);
        for command in &commands {
            assert_eq!(command.context().map(ContextId::as_str), Some("ctx1"));
        }
        assert_matches!(
            &commands[2],
            Command::SendToPropertyInspector { action, .. } if action.as_str() == "com.example.counter"
        );
    }

    #[tokio::test]
    async fn foreign_context_is_refused() {
        let sink = RecordingSink::new();
        let cx = context(&sink);
        let err = cx
            .send(Command::ShowOk {
                context: ContextId::new("never-appeared"),
            })
            .await
            .unwrap_err();
        assert_matches!(err, CommandError::UnknownContext(ref c) if c.as_str() == "never-appeared");

        cx.send(Command::log("no context needed")).await.unwrap();
        assert_eq!(sink.count(CommandKind::ShowOk), 0);
        assert_eq!(sink.count(CommandKind::LogMessage), 1);
    }

    #[tokio::test]
    async fn disposed_handle_refuses_commands() {
        let sink = RecordingSink::new();
        let cx = context(&sink);
        let clone = cx.clone();
        cx.dispose();

        assert!(clone.is_disposed());
        let err = clone.set_state(1).await.unwrap_err();
        assert_matches!(err, CommandError::Disposed(ref c) if c.as_str() == "ctx1");
        assert_eq!(sink.count(CommandKind::SetState), 0);
    }

    #[tokio::test]
    async fn sink_failure_surfaces_as_connection_error() {
        let sink = RecordingSink::new();
        sink.fail_sends(true);
        let cx = context(&sink);
        assert_matches!(cx.show_alert().await, Err(CommandError::Connection(_)));
    }

    #[test]
    fn identity_accessors() {
        let sink = RecordingSink::new();
        let cx = context(&sink);
        assert_eq!(cx.action().as_str(), "com.example.counter");
        assert_eq!(cx.device().map(DeviceId::as_str), Some("dev1"));
        assert!(!cx.cancellation().is_cancelled());
    }
}

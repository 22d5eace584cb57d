//! Plugin-level events: the ones not addressed to an action instance.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;
use keydeck_core::{ContextId, DeviceId, PluginUuid};
use keydeck_protocol::{ApplicationPayload, Command, DeviceInfo, GlobalSettingsPayload};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::action::HandlerResult;
use crate::errors::CommandError;
use crate::sink::CommandSink;

/// Handler for application, device, global-settings and wake events.
///
/// These bypass the instance table. Every method defaults to doing nothing.
#[async_trait]
#[allow(unused_variables)]
pub trait PluginHandler: Send + Sync + 'static {
    /// A monitored application launched.
    async fn on_application_did_launch(
        &self,
        cx: &PluginContext,
        payload: ApplicationPayload,
    ) -> HandlerResult {
        Ok(())
    }

    /// A monitored application quit.
    async fn on_application_did_terminate(
        &self,
        cx: &PluginContext,
        payload: ApplicationPayload,
    ) -> HandlerResult {
        Ok(())
    }

    /// A device was plugged in.
    async fn on_device_did_connect(
        &self,
        cx: &PluginContext,
        device: DeviceId,
        info: DeviceInfo,
    ) -> HandlerResult {
        Ok(())
    }

    /// A device was unplugged.
    async fn on_device_did_disconnect(&self, cx: &PluginContext, device: DeviceId) -> HandlerResult {
        Ok(())
    }

    /// The host delivered the plugin-wide settings.
    async fn on_did_receive_global_settings(
        &self,
        cx: &PluginContext,
        payload: GlobalSettingsPayload,
    ) -> HandlerResult {
        Ok(())
    }

    /// The computer woke from sleep.
    async fn on_system_did_wake_up(&self, cx: &PluginContext) -> HandlerResult {
        Ok(())
    }
}

/// A [`PluginHandler`] that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPluginHandler;

impl PluginHandler for NoopPluginHandler {}

/// Contexts currently visible on the host, shared between the router and
/// the plugin handle.
pub type LiveContexts = Arc<DashSet<ContextId>>;

/// Command handle for plugin-wide commands, addressed by the plugin UUID.
///
/// It may also address action instances directly, but only ones in its
/// [`LiveContexts`] set.
#[derive(Clone)]
pub struct PluginContext {
    plugin_uuid: PluginUuid,
    sink: Arc<dyn CommandSink>,
    cancel: CancellationToken,
    live: LiveContexts,
}

impl PluginContext {
    /// Build a plugin-wide handle.
    pub fn new(plugin_uuid: PluginUuid, sink: Arc<dyn CommandSink>, cancel: CancellationToken) -> Self {
        Self {
            plugin_uuid,
            sink,
            cancel,
            live: LiveContexts::default(),
        }
    }

    /// Share the router's set of visible contexts.
    #[must_use]
    pub fn with_live_contexts(mut self, live: LiveContexts) -> Self {
        self.live = live;
        self
    }

    /// The UUID the plugin registered under.
    pub fn plugin_uuid(&self) -> &PluginUuid {
        &self.plugin_uuid
    }

    /// Fires when the plugin is shutting down.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Send any command.
    ///
    /// Commands addressed to anything but the plugin UUID or a live context
    /// are refused with [`CommandError::UnknownContext`].
    pub async fn send(&self, command: Command) -> Result<(), CommandError> {
        if let Some(target) = command.context() {
            if target.as_str() != self.plugin_uuid.as_str() && !self.live.contains(target) {
                return Err(CommandError::UnknownContext(target.clone()));
            }
        }
        self.sink.send(command).await?;
        Ok(())
    }

    /// Persist plugin-wide settings.
    pub async fn set_global_settings(&self, settings: Value) -> Result<(), CommandError> {
        self.send(Command::SetGlobalSettings {
            context: ContextId::from(&self.plugin_uuid),
            settings,
        })
        .await
    }

    /// Ask the host for the plugin-wide settings.
    pub async fn get_global_settings(&self) -> Result<(), CommandError> {
        self.send(Command::GetGlobalSettings {
            context: ContextId::from(&self.plugin_uuid),
        })
        .await
    }

    /// Switch `device` to a bundled profile, or back when `profile` is `None`.
    pub async fn switch_to_profile(
        &self,
        device: DeviceId,
        profile: Option<String>,
    ) -> Result<(), CommandError> {
        self.send(Command::SwitchToProfile {
            context: ContextId::from(&self.plugin_uuid),
            device,
            profile,
        })
        .await
    }

    /// Open a URL in the user's browser.
    pub async fn open_url(&self, url: impl Into<String>) -> Result<(), CommandError> {
        self.send(Command::OpenUrl { url: url.into() }).await
    }

    /// Write a line to the host's plugin log.
    pub async fn log_message(&self, message: impl Into<String>) -> Result<(), CommandError> {
        self.send(Command::log(message)).await
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_uuid", &self.plugin_uuid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RecordingSink;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn global_commands_use_plugin_uuid() {
        let sink = RecordingSink::new();
        let cx = PluginContext::new(
            PluginUuid::new("ABCDEF123456"),
            Arc::new(sink.clone()),
            CancellationToken::new(),
        );
        cx.get_global_settings().await.unwrap();
        cx.switch_to_profile(DeviceId::new("dev1"), Some("Work".into()))
            .await
            .unwrap();
        cx.open_url("https://example.com").await.unwrap();

        let commands = sink.commands();
        assert_matches!(&commands[0], Command::GetGlobalSettings { context } if context.as_str() == "ABCDEF123456");
        assert_matches!(&commands[1], Command::SwitchToProfile { context, device, .. }
            if context.as_str() == "ABCDEF123456" && device.as_str() == "dev1");
        assert_eq!(commands[2].context(), None);
    }

    #[tokio::test]
    async fn instance_commands_need_a_live_context() {
        let sink = RecordingSink::new();
        let live = LiveContexts::default();
        let cx = PluginContext::new(
            PluginUuid::new("ABCDEF123456"),
            Arc::new(sink.clone()),
            CancellationToken::new(),
        )
        .with_live_contexts(Arc::clone(&live));
        let show_ok = |c: &str| Command::ShowOk {
            context: ContextId::new(c),
        };

        assert_matches!(
            cx.send(show_ok("ctx1")).await,
            Err(CommandError::UnknownContext(ref c)) if c.as_str() == "ctx1"
        );
        let _ = live.insert(ContextId::new("ctx1"));
        cx.send(show_ok("ctx1")).await.unwrap();
        assert_matches!(cx.send(show_ok("ctx2")).await, Err(CommandError::UnknownContext(_)));

        assert_eq!(sink.commands(), vec![show_ok("ctx1")]);
    }
}

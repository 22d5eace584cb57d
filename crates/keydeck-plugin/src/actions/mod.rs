//! Actions and plugin-level handlers shipped with the sample plugin.

pub mod counter;

use async_trait::async_trait;
use keydeck_core::DeviceId;
use keydeck_protocol::{DeviceInfo, GlobalSettingsPayload};
use keydeck_runtime::{HandlerResult, PluginContext, PluginHandler, PluginRuntime, RouterError};
use tracing::info;

pub use counter::{COUNTER_ACTION, Counter};

/// Register every bundled action and the plugin handler.
pub fn register(runtime: &mut PluginRuntime) -> Result<(), RouterError> {
    let _ = runtime
        .map_action(COUNTER_ACTION, |_| Counter::new())?
        .plugin_handler(SamplePlugin);
    Ok(())
}

/// Logs device changes and refreshes global settings after sleep.
#[derive(Clone, Copy, Debug, Default)]
pub struct SamplePlugin;

#[async_trait]
impl PluginHandler for SamplePlugin {
    async fn on_device_did_connect(
        &self,
        _cx: &PluginContext,
        device: DeviceId,
        info: DeviceInfo,
    ) -> HandlerResult {
        info!(
            %device,
            name = %info.name,
            columns = info.size.columns,
            rows = info.size.rows,
            "device connected"
        );
        Ok(())
    }

    async fn on_device_did_disconnect(&self, _cx: &PluginContext, device: DeviceId) -> HandlerResult {
        info!(%device, "device disconnected");
        Ok(())
    }

    async fn on_did_receive_global_settings(
        &self,
        _cx: &PluginContext,
        payload: GlobalSettingsPayload,
    ) -> HandlerResult {
        info!(settings = %payload.settings, "global settings received");
        Ok(())
    }

    async fn on_system_did_wake_up(&self, cx: &PluginContext) -> HandlerResult {
        cx.get_global_settings().await?;
        Ok(())
    }
}

//! Counts key presses and shows the count as the key title.
//!
//! The count lives in the instance's persisted settings (`{"count": n}`) so it
//! survives profile switches and host restarts. A property inspector can
//! reset it by sending `{"reset": true}`.

use async_trait::async_trait;
use keydeck_protocol::{AppearancePayload, KeyPayload, SettingsPayload};
use keydeck_runtime::{Action, ActionContext, HandlerResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Action UUID the host knows this action by.
pub const COUNTER_ACTION: &str = "dev.keydeck.sample.counter";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct CounterSettings {
    #[serde(default)]
    count: u64,
}

impl CounterSettings {
    fn from_value(settings: &Value) -> Self {
        serde_json::from_value(settings.clone()).unwrap_or_default()
    }

    fn to_value(self) -> Value {
        serde_json::json!({ "count": self.count })
    }
}

/// One counter key.
#[derive(Debug, Default)]
pub struct Counter {
    count: Mutex<u64>,
}

impl Counter {
    /// A counter starting at zero until the host delivers its settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count.
    #[cfg(test)]
    pub fn count(&self) -> u64 {
        *self.count.lock()
    }

    fn adopt(&self, settings: &Value) -> u64 {
        let count = CounterSettings::from_value(settings).count;
        *self.count.lock() = count;
        count
    }

    async fn publish(&self, cx: &ActionContext, count: u64) -> HandlerResult {
        cx.set_settings(CounterSettings { count }.to_value()).await?;
        cx.set_title(count.to_string()).await?;
        Ok(())
    }
}

#[async_trait]
impl Action for Counter {
    async fn on_will_appear(&self, cx: &ActionContext, payload: AppearancePayload) -> HandlerResult {
        let count = self.adopt(&payload.settings);
        cx.set_title(count.to_string()).await?;
        Ok(())
    }

    async fn on_did_receive_settings(
        &self,
        cx: &ActionContext,
        payload: SettingsPayload,
    ) -> HandlerResult {
        let count = self.adopt(&payload.settings);
        debug!(count, "settings received");
        cx.set_title(count.to_string()).await?;
        Ok(())
    }

    async fn on_key_down(&self, cx: &ActionContext, _payload: KeyPayload) -> HandlerResult {
        let count = {
            let mut guard = self.count.lock();
            *guard = guard.saturating_add(1);
            *guard
        };
        self.publish(cx, count).await
    }

    async fn on_send_to_plugin(&self, cx: &ActionContext, payload: Value) -> HandlerResult {
        if payload.get("reset").and_then(Value::as_bool) == Some(true) {
            *self.count.lock() = 0;
            self.publish(cx, 0).await?;
            cx.show_ok().await?;
        }
        Ok(())
    }
}

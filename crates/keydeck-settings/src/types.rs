//! Settings types and their compiled defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeydeckSettings {
    /// WebSocket session settings.
    pub connection: ConnectionSettings,
    /// Handler dispatch settings.
    pub dispatcher: DispatcherSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl KeydeckSettings {
    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.connection.host.is_empty() {
            return Err(SettingsError::invalid("connection.host", "must not be empty"));
        }
        if self.connection.send_queue_capacity == 0 {
            return Err(SettingsError::invalid("connection.send_queue_capacity", "must be positive"));
        }
        if self.connection.event_channel_capacity == 0 {
            return Err(SettingsError::invalid("connection.event_channel_capacity", "must be positive"));
        }
        if self.dispatcher.drain_poll_interval_ms == 0 {
            return Err(SettingsError::invalid("dispatcher.drain_poll_interval_ms", "must be positive"));
        }
        Ok(())
    }
}

/// WebSocket session settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Host name the plugin connects to (default `"localhost"`).
    pub host: String,
    /// Upper bound on opening the transport, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Upper bound on the close handshake, in milliseconds.
    pub close_timeout_ms: u64,
    /// Outbound frames buffered ahead of the writer.
    pub send_queue_capacity: usize,
    /// Capacity of the broadcast channel for external subscribers.
    pub event_channel_capacity: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            connect_timeout_ms: 10_000,
            close_timeout_ms: 2_000,
            send_queue_capacity: 256,
            event_channel_capacity: 1024,
        }
    }
}

impl ConnectionSettings {
    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Close handshake timeout as a [`Duration`].
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

/// Handler dispatch settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherSettings {
    /// How long shutdown waits for in-flight handlers, in milliseconds.
    pub drain_timeout_ms: u64,
    /// How often drain re-checks the in-flight count, in milliseconds.
    pub drain_poll_interval_ms: u64,
    /// Whether handler faults flash the alert glyph on the originating key.
    pub alert_on_fault: bool,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            drain_timeout_ms: 5_000,
            drain_poll_interval_ms: 10,
            alert_on_fault: true,
        }
    }
}

impl DispatcherSettings {
    /// Drain timeout as a [`Duration`].
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Drain poll interval as a [`Duration`].
    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` wins when set.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = KeydeckSettings::default();
        assert_eq!(settings.connection.host, "localhost");
        assert_eq!(settings.connection.close_timeout(), Duration::from_secs(2));
        assert_eq!(settings.dispatcher.drain_timeout(), Duration::from_secs(5));
        assert!(settings.dispatcher.alert_on_fault);
        assert_eq!(settings.logging.level, "info");
        settings.validate().unwrap();
    }

    #[test]
    fn zero_queue_is_invalid() {
        let mut settings = KeydeckSettings::default();
        settings.connection.send_queue_capacity = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn empty_host_is_invalid() {
        let mut settings = KeydeckSettings::default();
        settings.connection.host.clear();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let settings = KeydeckSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: KeydeckSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: KeydeckSettings =
            serde_json::from_str(r#"{"dispatcher": {"drain_timeout_ms": 100}}"#).unwrap();
        assert_eq!(settings.dispatcher.drain_timeout_ms, 100);
        assert_eq!(settings.dispatcher.drain_poll_interval_ms, 10);
        assert_eq!(settings.connection, ConnectionSettings::default());
    }
}

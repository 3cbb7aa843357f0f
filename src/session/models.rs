use std::time::Duration;

use serde::{Deserialize, Serialize};

// Re-export protocol models consumed alongside session state.
pub use crate::serial::protocol::{OutputState, CHANNEL_COUNT};

/// Connection lifecycle of the one instrument this session drives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Connected; carries the identity string the instrument reported.
    Connected(String),
    /// A connection attempt failed; carries the operator-visible reason.
    Failed(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }
}

/// One telemetry update from the background poller. `channel` is the
/// 0-based channel index; values are the instrument's own text, shown
/// unconverted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TelemetryEvent {
    Voltage { channel: usize, text: String },
    Current { channel: usize, text: String },
}

/// Last-known telemetry for one channel. Replace-on-arrival; no history.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChannelReadings {
    pub voltage: String,
    pub current: String,
}

/// Tunables for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            read_timeout_ms: 1000,
            poll_interval_ms: 500,
        }
    }
}

impl SessionConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

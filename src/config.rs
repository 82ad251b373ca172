//! Configuration for transports, listeners and connectors.
//!
//! Every struct has a usable `Default` and deserializes with missing
//! fields filled from it, so a hosting process can embed these in its own
//! JSON configuration.
//!
//! ```
//! use stompwire::config::ConnectorConfig;
//!
//! let config = ConnectorConfig::from_json(r#"{ "retry_interval_ms": 250 }"#).unwrap();
//! assert_eq!(config.retry_interval().as_millis(), 250);
//! assert_eq!(config.transport.channel_capacity, 1024);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::DEFAULT_MAX_FRAME_SIZE;

/// Default send queue capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default maximum pending frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default socket read buffer size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Default interval between connect attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Default interval between rebind attempts after an accept failure.
pub const DEFAULT_REBIND_INTERVAL: Duration = Duration::from_secs(1);

/// Per-connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Capacity of the send queue feeding the writer task.
    pub channel_capacity: usize,
    /// Maximum pending frames before `send` waits.
    pub max_pending_frames: usize,
    /// How long `send` waits for backpressure to clear.
    pub backpressure_timeout_ms: u64,
    /// Size of each socket read.
    pub read_buffer_size: usize,
    /// Largest frame the parser accepts.
    pub max_frame_size: usize,
}

impl TransportConfig {
    pub fn backpressure_timeout(&self) -> Duration {
        Duration::from_millis(self.backpressure_timeout_ms)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            backpressure_timeout_ms: DEFAULT_BACKPRESSURE_TIMEOUT.as_millis() as u64,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Settings for [`Listener`](crate::transport::Listener).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Delay between rebind attempts after a bind or accept failure.
    pub rebind_interval_ms: u64,
    /// Settings applied to every accepted transport.
    pub transport: TransportConfig,
}

impl ListenerConfig {
    pub fn rebind_interval(&self) -> Duration {
        Duration::from_millis(self.rebind_interval_ms)
    }

    /// Parse from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            rebind_interval_ms: DEFAULT_REBIND_INTERVAL.as_millis() as u64,
            transport: TransportConfig::default(),
        }
    }
}

/// Settings for [`ClientConnector`](crate::transport::ClientConnector).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Delay between connect attempts while disconnected.
    pub retry_interval_ms: u64,
    /// Emit failed connect attempts as `TransportEvent::Error`.
    pub report_connect_errors: bool,
    /// Settings applied to every established connection.
    pub transport: TransportConfig,
}

impl ConnectorConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Parse from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: DEFAULT_RETRY_INTERVAL.as_millis() as u64,
            report_connect_errors: false,
            transport: TransportConfig::default(),
        }
    }
}

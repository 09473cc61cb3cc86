//! Supervisor liveness heartbeats.
//!
//! Every supervisor periodically publishes a heartbeat on the dedicated
//! topic so that monitoring tools can tell a silent system from a dead
//! one. The wire shape is a small JSON object `{id, timestamp, status}`
//! using the same ISO-8601 rendering as the value codec.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::CodecError;

/// Lifecycle status carried by a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeartbeatStatus {
    /// The tool is booting.
    StartingUp,
    /// The tool is fully operative.
    Running,
    /// The tool is alive but intentionally not processing.
    Paused,
    /// The tool is shutting down.
    Exiting,
    /// The tool terminated.
    ShutDown,
    /// Some of the tool's components are not operative.
    PartiallyRunning,
}

/// A heartbeat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    /// Full running id of the emitting tool.
    pub id: String,
    /// Emission instant, epoch milliseconds.
    pub timestamp: u64,
    /// Lifecycle status at emission time.
    pub status: HeartbeatStatus,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireHeartbeat {
    id: String,
    timestamp: String,
    status: HeartbeatStatus,
}

impl Heartbeat {
    /// Builds a heartbeat emitted now.
    #[must_use]
    pub fn new(id: impl Into<String>, timestamp: u64, status: HeartbeatStatus) -> Self {
        Self {
            id: id.into(),
            timestamp,
            status,
        }
    }

    /// Encodes to the wire JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Malformed`] when serialization fails.
    pub fn encode(&self) -> Result<String, CodecError> {
        #[allow(clippy::cast_possible_wrap)]
        let dt = DateTime::<Utc>::from_timestamp_millis(self.timestamp as i64)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let wire = WireHeartbeat {
            id: self.id.clone(),
            timestamp: dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            status: self.status,
        };
        Ok(serde_json::to_string(&wire)?)
    }

    /// Decodes a wire JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Malformed`] for invalid JSON and
    /// [`CodecError::BadTimestamp`] for an unparseable timestamp.
    pub fn decode(json: &str) -> Result<Self, CodecError> {
        let wire: WireHeartbeat = serde_json::from_str(json)?;
        let naive = NaiveDateTime::parse_from_str(&wire.timestamp, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|_| CodecError::BadTimestamp(wire.timestamp.clone()))?;
        let ms = naive.and_utc().timestamp_millis();
        let timestamp =
            u64::try_from(ms).map_err(|_| CodecError::BadTimestamp(wire.timestamp.clone()))?;
        Ok(Self {
            id: wire.id,
            timestamp,
            status: wire.status,
        })
    }
}

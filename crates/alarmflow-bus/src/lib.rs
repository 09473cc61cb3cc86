//! Message bus layer of the alarmflow alarm system.
//!
//! Distributed units and supervisors never talk to Kafka directly: they
//! publish through [`OutputPublisher`] and consume through
//! [`InputSubscriber`]. The Kafka implementations live in [`kafka`];
//! [`memory`] provides an in-process bus used by tests and by the
//! supervisor to wire its DASUs to itself.

pub mod error;
pub mod kafka;
pub mod memory;
mod traits;

pub use error::BusError;
pub use traits::{InputSubscriber, OutputPublisher, ValueListener};

/// Topic carrying raw plugin samples to the converter.
pub const PLUGINS_TOPIC: &str = "PluginsKTopic";

/// Topic carrying core values: the inbound stream of every supervisor
/// and the single outbound stream aggregating all produced outputs.
pub const CORE_TOPIC: &str = "BsdbCoreKTopic";

/// Topic carrying heartbeats.
pub const HEARTBEAT_TOPIC: &str = "HeartbeatTopic";

//! Operational mode of a monitor point or of the system producing it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operational mode attached to every value.
///
/// The mode travels with the value and is never interpreted by the core:
/// transfer functions decide how modes of the inputs shape the mode of
/// the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationalMode {
    /// The producer is starting up.
    Startup,
    /// The producer is initializing its resources.
    Initialization,
    /// The producer is shutting down.
    Closing,
    /// The producer has been shut down.
    Shutteddown,
    /// The monitored system is under maintenance.
    Maintenance,
    /// Normal operation.
    Operational,
    /// Operation with reduced functionality.
    Degraded,
    /// The mode could not be determined.
    Unknown,
}

impl fmt::Display for OperationalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationalMode::Startup => "STARTUP",
            OperationalMode::Initialization => "INITIALIZATION",
            OperationalMode::Closing => "CLOSING",
            OperationalMode::Shutteddown => "SHUTTEDDOWN",
            OperationalMode::Maintenance => "MAINTENANCE",
            OperationalMode::Operational => "OPERATIONAL",
            OperationalMode::Degraded => "DEGRADED",
            OperationalMode::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

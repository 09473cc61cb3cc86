//! Alarm priorities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of an alarm: cleared, or set at one of four priorities.
///
/// [`Priority::Cleared`] is the only "not set" value; the numeric order
/// of the set priorities is Low < Medium < High < Critical.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Alarm clear or unset.
    Cleared,
    /// Low priority alarm set.
    SetLow,
    /// Medium priority alarm set.
    SetMedium,
    /// High priority alarm set.
    SetHigh,
    /// Critical alarm set.
    SetCritical,
}

impl Priority {
    /// `true` when the alarm is set at any priority.
    #[must_use]
    pub fn is_set(self) -> bool {
        self != Priority::Cleared
    }

    /// The default priority for a newly set alarm.
    #[must_use]
    pub fn default_set() -> Self {
        Priority::SetMedium
    }

    /// The next higher priority, saturating at critical.
    ///
    /// Increasing a cleared alarm is meaningless and returns `None`.
    #[must_use]
    pub fn increase(self) -> Option<Self> {
        match self {
            Priority::Cleared => None,
            Priority::SetLow => Some(Priority::SetMedium),
            Priority::SetMedium => Some(Priority::SetHigh),
            Priority::SetHigh | Priority::SetCritical => Some(Priority::SetCritical),
        }
    }

    /// The next lower priority, saturating at low.
    ///
    /// Lowering a cleared alarm is meaningless and returns `None`.
    #[must_use]
    pub fn lower(self) -> Option<Self> {
        match self {
            Priority::Cleared => None,
            Priority::SetLow | Priority::SetMedium => Some(Priority::SetLow),
            Priority::SetHigh => Some(Priority::SetMedium),
            Priority::SetCritical => Some(Priority::SetHigh),
        }
    }

    /// The wire rendering, e.g. `SET_MEDIUM`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Cleared => "CLEARED",
            Priority::SetLow => "SET_LOW",
            Priority::SetMedium => "SET_MEDIUM",
            Priority::SetHigh => "SET_HIGH",
            Priority::SetCritical => "SET_CRITICAL",
        }
    }

    /// Parses the wire rendering.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CLEARED" => Some(Priority::Cleared),
            "SET_LOW" => Some(Priority::SetLow),
            "SET_MEDIUM" => Some(Priority::SetMedium),
            "SET_HIGH" => Some(Priority::SetHigh),
            "SET_CRITICAL" => Some(Priority::SetCritical),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

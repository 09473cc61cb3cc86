//! Validity of values flowing through the core.
//!
//! A value is either `Reliable` or `Unreliable`; combining validities
//! takes the minimum (any unreliable contribution makes the result
//! unreliable). On top of the stored tag, an *age rule* applies on
//! consumption: a value whose production timestamp is older than the
//! refresh period plus tolerance is unreliable no matter what its tag
//! says.

use serde::{Deserialize, Serialize};

/// Reliability tag of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Validity {
    /// The value cannot be trusted: stale, or derived from stale inputs.
    #[serde(rename = "UNRELIABLE")]
    Unreliable,
    /// The value is fresh and all its contributors were reliable.
    #[serde(rename = "RELIABLE")]
    Reliable,
}

impl Validity {
    /// Combines two validities: reliable only when both are.
    #[must_use]
    pub fn min(self, other: Validity) -> Validity {
        if self == Validity::Reliable && other == Validity::Reliable {
            Validity::Reliable
        } else {
            Validity::Unreliable
        }
    }

    /// Combines any number of validities; an empty iterator is reliable.
    #[must_use]
    pub fn min_of<I: IntoIterator<Item = Validity>>(iter: I) -> Validity {
        iter.into_iter().fold(Validity::Reliable, Validity::min)
    }

    /// `true` when the tag is [`Validity::Reliable`].
    #[must_use]
    pub fn is_reliable(self) -> bool {
        self == Validity::Reliable
    }
}

/// A validity tag together with the instant it was observed.
///
/// Carrying the observation time with the tag makes the age rule
/// computable locally, without assuming synchronized clocks across
/// components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedValidity {
    /// The stored tag.
    pub tag: Validity,
    /// Epoch milliseconds at which the tag was observed.
    pub observed_at: u64,
}

impl TimedValidity {
    /// A new timed validity observed now.
    #[must_use]
    pub fn new(tag: Validity, observed_at: u64) -> Self {
        Self { tag, observed_at }
    }

    /// Applies the age rule: the stored tag, downgraded to unreliable
    /// when `produced_at` is older than `time_frame_ms` relative to
    /// `now_ms`.
    #[must_use]
    pub fn aged(self, produced_at: u64, now_ms: u64, time_frame_ms: u64) -> Validity {
        if now_ms.saturating_sub(produced_at) > time_frame_ms {
            Validity::Unreliable
        } else {
            self.tag
        }
    }
}

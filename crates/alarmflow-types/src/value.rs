//! The immutable value record flowing through the system.
//!
//! An [`IasValue`] carries a typed payload, the operational mode and
//! validity, the full running id of its producer, up to seven timestamps
//! marking the processing hops from the plugin down to the DASU, the set
//! of inputs that contributed to it, and free-form string properties.
//!
//! Values are immutable: the `with_*` methods return an updated copy.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::alarm::Priority;
use crate::mode::OperationalMode;
use crate::validity::Validity;

/// Type tag of a value payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IasValueType {
    /// 64 bit signed integer.
    #[serde(rename = "LONG")]
    Long,
    /// 32 bit signed integer.
    #[serde(rename = "INT")]
    Int,
    /// 16 bit signed integer.
    #[serde(rename = "SHORT")]
    Short,
    /// 8 bit signed integer.
    #[serde(rename = "BYTE")]
    Byte,
    /// 64 bit float.
    #[serde(rename = "DOUBLE")]
    Double,
    /// 32 bit float.
    #[serde(rename = "FLOAT")]
    Float,
    /// Boolean.
    #[serde(rename = "BOOLEAN")]
    Boolean,
    /// Single character.
    #[serde(rename = "CHAR")]
    Char,
    /// UTF-8 string.
    #[serde(rename = "STRING")]
    String,
    /// Alarm priority.
    #[serde(rename = "ALARM")]
    Alarm,
    /// Point in time, epoch milliseconds.
    #[serde(rename = "TIMESTAMP")]
    Timestamp,
    /// Array of 64 bit integers.
    #[serde(rename = "ARRAYOFLONG")]
    ArrayOfLong,
    /// Array of 64 bit floats.
    #[serde(rename = "ARRAYOFDOUBLE")]
    ArrayOfDouble,
}

impl IasValueType {
    /// The wire rendering of the tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            IasValueType::Long => "LONG",
            IasValueType::Int => "INT",
            IasValueType::Short => "SHORT",
            IasValueType::Byte => "BYTE",
            IasValueType::Double => "DOUBLE",
            IasValueType::Float => "FLOAT",
            IasValueType::Boolean => "BOOLEAN",
            IasValueType::Char => "CHAR",
            IasValueType::String => "STRING",
            IasValueType::Alarm => "ALARM",
            IasValueType::Timestamp => "TIMESTAMP",
            IasValueType::ArrayOfLong => "ARRAYOFLONG",
            IasValueType::ArrayOfDouble => "ARRAYOFDOUBLE",
        }
    }

    /// Parses the wire rendering of a tag.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LONG" => Some(IasValueType::Long),
            "INT" => Some(IasValueType::Int),
            "SHORT" => Some(IasValueType::Short),
            "BYTE" => Some(IasValueType::Byte),
            "DOUBLE" => Some(IasValueType::Double),
            "FLOAT" => Some(IasValueType::Float),
            "BOOLEAN" => Some(IasValueType::Boolean),
            "CHAR" => Some(IasValueType::Char),
            "STRING" => Some(IasValueType::String),
            "ALARM" => Some(IasValueType::Alarm),
            "TIMESTAMP" => Some(IasValueType::Timestamp),
            "ARRAYOFLONG" => Some(IasValueType::ArrayOfLong),
            "ARRAYOFDOUBLE" => Some(IasValueType::ArrayOfDouble),
            _ => None,
        }
    }

    /// `true` for the numeric tags coercible to `f64`.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            IasValueType::Long
                | IasValueType::Int
                | IasValueType::Short
                | IasValueType::Byte
                | IasValueType::Double
                | IasValueType::Float
        )
    }
}

impl fmt::Display for IasValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by value construction and payload parsing.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    /// The payload does not match the declared type tag.
    #[error("payload type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// The declared tag.
        expected: IasValueType,
        /// The tag of the payload actually supplied.
        got: IasValueType,
    },

    /// A string rendering could not be parsed as the tagged type.
    #[error("cannot parse '{value}' as {value_type}")]
    ParseFailure {
        /// The declared tag.
        value_type: IasValueType,
        /// The string that failed to parse.
        value: String,
    },

    /// Both a plugin and a DASU production timestamp were supplied.
    ///
    /// Exactly one of the two is set on a value: it either entered the
    /// system through a plugin or was produced inside a DASU.
    #[error("a value cannot carry both plugin and DASU production timestamps")]
    ConflictingProduction,

    /// The full running id is empty.
    #[error("empty full running id")]
    EmptyId,
}

/// A typed payload; the variant always matches the value's type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// 64 bit signed integer.
    Long(i64),
    /// 32 bit signed integer.
    Int(i32),
    /// 16 bit signed integer.
    Short(i16),
    /// 8 bit signed integer.
    Byte(i8),
    /// 64 bit float.
    Double(f64),
    /// 32 bit float.
    Float(f32),
    /// Boolean.
    Boolean(bool),
    /// Single character.
    Char(char),
    /// UTF-8 string.
    String(String),
    /// Alarm priority.
    Alarm(Priority),
    /// Point in time, epoch milliseconds.
    Timestamp(u64),
    /// Array of 64 bit integers.
    ArrayOfLong(Vec<i64>),
    /// Array of 64 bit floats.
    ArrayOfDouble(Vec<f64>),
}

impl Payload {
    /// The type tag matching this payload.
    #[must_use]
    pub fn value_type(&self) -> IasValueType {
        match self {
            Payload::Long(_) => IasValueType::Long,
            Payload::Int(_) => IasValueType::Int,
            Payload::Short(_) => IasValueType::Short,
            Payload::Byte(_) => IasValueType::Byte,
            Payload::Double(_) => IasValueType::Double,
            Payload::Float(_) => IasValueType::Float,
            Payload::Boolean(_) => IasValueType::Boolean,
            Payload::Char(_) => IasValueType::Char,
            Payload::String(_) => IasValueType::String,
            Payload::Alarm(_) => IasValueType::Alarm,
            Payload::Timestamp(_) => IasValueType::Timestamp,
            Payload::ArrayOfLong(_) => IasValueType::ArrayOfLong,
            Payload::ArrayOfDouble(_) => IasValueType::ArrayOfDouble,
        }
    }

    /// The neutral payload of a type tag, used as the output of a
    /// computing element before its first evaluation: zero for numbers,
    /// cleared for alarms, empty for strings and arrays.
    #[must_use]
    pub fn default_for(value_type: IasValueType) -> Self {
        match value_type {
            IasValueType::Long => Payload::Long(0),
            IasValueType::Int => Payload::Int(0),
            IasValueType::Short => Payload::Short(0),
            IasValueType::Byte => Payload::Byte(0),
            IasValueType::Double => Payload::Double(0.0),
            IasValueType::Float => Payload::Float(0.0),
            IasValueType::Boolean => Payload::Boolean(false),
            IasValueType::Char => Payload::Char(' '),
            IasValueType::String => Payload::String(String::new()),
            IasValueType::Alarm => Payload::Alarm(crate::Priority::Cleared),
            IasValueType::Timestamp => Payload::Timestamp(0),
            IasValueType::ArrayOfLong => Payload::ArrayOfLong(Vec::new()),
            IasValueType::ArrayOfDouble => Payload::ArrayOfDouble(Vec::new()),
        }
    }

    /// Numeric payloads coerced to `f64`; `None` for the other tags.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        #[allow(clippy::cast_precision_loss)]
        match *self {
            Payload::Long(v) => Some(v as f64),
            Payload::Int(v) => Some(f64::from(v)),
            Payload::Short(v) => Some(f64::from(v)),
            Payload::Byte(v) => Some(f64::from(v)),
            Payload::Double(v) => Some(v),
            Payload::Float(v) => Some(f64::from(v)),
            _ => None,
        }
    }

    /// The alarm priority, when the payload is an alarm.
    #[must_use]
    pub fn as_alarm(&self) -> Option<Priority> {
        match self {
            Payload::Alarm(p) => Some(*p),
            _ => None,
        }
    }

    /// The wire string rendering of the payload; the type tag selects
    /// the parser on the way back ([`Payload::parse`]).
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Payload::Long(v) => v.to_string(),
            Payload::Int(v) => v.to_string(),
            Payload::Short(v) => v.to_string(),
            Payload::Byte(v) => v.to_string(),
            Payload::Double(v) => v.to_string(),
            Payload::Float(v) => v.to_string(),
            Payload::Boolean(v) => v.to_string(),
            Payload::Char(v) => v.to_string(),
            Payload::String(v) => v.clone(),
            Payload::Alarm(p) => p.as_str().to_string(),
            Payload::Timestamp(v) => v.to_string(),
            Payload::ArrayOfLong(vs) => {
                let elems: Vec<String> = vs.iter().map(ToString::to_string).collect();
                format!("[{}]", elems.join(","))
            }
            Payload::ArrayOfDouble(vs) => {
                let elems: Vec<String> = vs.iter().map(ToString::to_string).collect();
                format!("[{}]", elems.join(","))
            }
        }
    }

    /// Parses a wire string rendering according to the type tag.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::ParseFailure`] when the string is not a
    /// valid rendering of the tagged type.
    pub fn parse(value_type: IasValueType, s: &str) -> Result<Self, ValueError> {
        let fail = || ValueError::ParseFailure {
            value_type,
            value: s.to_string(),
        };
        match value_type {
            IasValueType::Long => s.parse().map(Payload::Long).map_err(|_| fail()),
            IasValueType::Int => s.parse().map(Payload::Int).map_err(|_| fail()),
            IasValueType::Short => s.parse().map(Payload::Short).map_err(|_| fail()),
            IasValueType::Byte => s.parse().map(Payload::Byte).map_err(|_| fail()),
            IasValueType::Double => s.parse().map(Payload::Double).map_err(|_| fail()),
            IasValueType::Float => s.parse().map(Payload::Float).map_err(|_| fail()),
            IasValueType::Boolean => s.parse().map(Payload::Boolean).map_err(|_| fail()),
            IasValueType::Char => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Payload::Char(c)),
                    _ => Err(fail()),
                }
            }
            IasValueType::String => Ok(Payload::String(s.to_string())),
            IasValueType::Alarm => Priority::parse(s).map(Payload::Alarm).ok_or_else(fail),
            IasValueType::Timestamp => s.parse().map(Payload::Timestamp).map_err(|_| fail()),
            IasValueType::ArrayOfLong => parse_array(s)
                .map(Payload::ArrayOfLong)
                .ok_or_else(fail),
            IasValueType::ArrayOfDouble => parse_array(s)
                .map(Payload::ArrayOfDouble)
                .ok_or_else(fail),
        }
    }
}

fn parse_array<T: std::str::FromStr>(s: &str) -> Option<Vec<T>> {
    let inner = s.strip_prefix('[')?.strip_suffix(']')?;
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }
    inner
        .split(',')
        .map(|e| e.trim().parse().ok())
        .collect()
}

/// The immutable record carried on the bus and inside the core.
#[derive(Debug, Clone, PartialEq)]
pub struct IasValue {
    /// Full running id of the producing IASIO.
    pub full_running_id: String,
    /// Type tag; always matches `payload`.
    pub value_type: IasValueType,
    /// The typed payload.
    pub payload: Payload,
    /// Operational mode.
    pub mode: OperationalMode,
    /// Reliability tag.
    pub validity: Validity,
    /// When the plugin sampled the monitor point (epoch ms).
    pub plugin_production: Option<u64>,
    /// When the plugin handed the sample to the converter.
    pub sent_to_converter: Option<u64>,
    /// When the converter received the sample.
    pub received_from_plugin: Option<u64>,
    /// When the converter produced the core value.
    pub converter_production: Option<u64>,
    /// When the value was pushed on the bus.
    pub sent_to_bsdb: Option<u64>,
    /// When the value was read from the bus.
    pub read_from_bsdb: Option<u64>,
    /// When a DASU produced the value.
    pub dasu_production: Option<u64>,
    /// Full running ids of the inputs that contributed to this value.
    pub dependents: Option<BTreeSet<String>>,
    /// Free-form string properties.
    pub props: Option<BTreeMap<String, String>>,
}

impl IasValue {
    /// Builds a value with no timestamps, dependents or properties.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::EmptyId`] for an empty full running id.
    pub fn new(
        full_running_id: impl Into<String>,
        payload: Payload,
        mode: OperationalMode,
        validity: Validity,
    ) -> Result<Self, ValueError> {
        let full_running_id = full_running_id.into();
        if full_running_id.is_empty() {
            return Err(ValueError::EmptyId);
        }
        Ok(Self {
            full_running_id,
            value_type: payload.value_type(),
            payload,
            mode,
            validity,
            plugin_production: None,
            sent_to_converter: None,
            received_from_plugin: None,
            converter_production: None,
            sent_to_bsdb: None,
            read_from_bsdb: None,
            dasu_production: None,
            dependents: None,
            props: None,
        })
    }

    /// The plain id: the local id of the last element of the full
    /// running id, or the whole string when it is not kind-annotated.
    #[must_use]
    pub fn id(&self) -> &str {
        let last = self
            .full_running_id
            .rsplit('@')
            .next()
            .unwrap_or(&self.full_running_id);
        last.strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .and_then(|s| s.rsplit_once(':'))
            .map_or(last, |(id, _kind)| id)
    }

    /// The most recent production timestamp: DASU, else converter, else
    /// plugin. This is the instant the age rule measures against.
    #[must_use]
    pub fn production_timestamp(&self) -> Option<u64> {
        self.dasu_production
            .or(self.converter_production)
            .or(self.plugin_production)
    }

    /// A copy with a new payload (same type tag required).
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::TypeMismatch`] when the payload's tag
    /// differs from the value's.
    pub fn with_payload(mut self, payload: Payload) -> Result<Self, ValueError> {
        if payload.value_type() != self.value_type {
            return Err(ValueError::TypeMismatch {
                expected: self.value_type,
                got: payload.value_type(),
            });
        }
        self.payload = payload;
        Ok(self)
    }

    /// A copy with a new operational mode.
    #[must_use]
    pub fn with_mode(mut self, mode: OperationalMode) -> Self {
        self.mode = mode;
        self
    }

    /// A copy with a new validity tag.
    #[must_use]
    pub fn with_validity(mut self, validity: Validity) -> Self {
        self.validity = validity;
        self
    }

    /// A copy stamped as produced by a plugin.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::ConflictingProduction`] when the value
    /// already carries a DASU production timestamp.
    pub fn with_plugin_production(mut self, ts: u64) -> Result<Self, ValueError> {
        if self.dasu_production.is_some() {
            return Err(ValueError::ConflictingProduction);
        }
        self.plugin_production = Some(ts);
        Ok(self)
    }

    /// A copy stamped as produced by a DASU.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::ConflictingProduction`] when the value
    /// already carries a plugin production timestamp.
    pub fn with_dasu_production(mut self, ts: u64) -> Result<Self, ValueError> {
        if self.plugin_production.is_some() {
            return Err(ValueError::ConflictingProduction);
        }
        self.dasu_production = Some(ts);
        Ok(self)
    }

    /// A copy stamped with the instant it was pushed on the bus.
    #[must_use]
    pub fn with_sent_to_bsdb(mut self, ts: u64) -> Self {
        self.sent_to_bsdb = Some(ts);
        self
    }

    /// A copy stamped with the instant it was read from the bus.
    #[must_use]
    pub fn with_read_from_bsdb(mut self, ts: u64) -> Self {
        self.read_from_bsdb = Some(ts);
        self
    }

    /// A copy with the given dependent set; an empty set clears it.
    #[must_use]
    pub fn with_dependents(mut self, deps: BTreeSet<String>) -> Self {
        self.dependents = if deps.is_empty() { None } else { Some(deps) };
        self
    }

    /// A copy with the given properties; an empty map clears them.
    #[must_use]
    pub fn with_props(mut self, props: BTreeMap<String, String>) -> Self {
        self.props = if props.is_empty() { None } else { Some(props) };
        self
    }
}

//! JSON wire codec for [`IasValue`].
//!
//! The wire shape is a flat JSON object whose payload is the string
//! rendering of the typed value; the `valueType` tag selects the parser
//! on decode. Absent optionals are omitted entirely, never `null`.
//! Timestamps travel as ISO-8601 (`yyyy-MM-dd'T'HH:mm:ss.S`, UTC).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::{IasValue, IasValueType, Payload, ValueError};
use crate::{OperationalMode, Validity};

/// Timestamp rendering on the wire, millisecond precision, UTC.
const ISO8601: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Errors raised while encoding or decoding wire values.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The input is not a well-formed JSON object of the expected shape.
    #[error("malformed wire value: {0}")]
    Malformed(String),

    /// The `valueType` tag is not one of the known tags.
    #[error("unknown value type tag: {0}")]
    UnknownType(String),

    /// The payload string does not parse as the tagged type, or the
    /// decoded record violates a value invariant.
    #[error(transparent)]
    InvalidValue(#[from] ValueError),

    /// A timestamp field is not valid ISO-8601.
    #[error("unparseable timestamp '{0}'")]
    BadTimestamp(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::Malformed(e.to_string())
    }
}

/// Wire shape of a value.
///
/// Kept separate from [`IasValue`] so the in-memory record stays
/// immutable and strongly typed while the wire side carries strings.
#[derive(Debug, Serialize, Deserialize)]
struct WireValue {
    #[serde(rename = "fullRunningId")]
    full_running_id: String,
    #[serde(rename = "valueType")]
    value_type: String,
    value: String,
    mode: OperationalMode,
    #[serde(rename = "iasValidity")]
    ias_validity: Validity,
    #[serde(rename = "pluginProductionTStamp", skip_serializing_if = "Option::is_none")]
    plugin_production: Option<String>,
    #[serde(rename = "sentToConverterTStamp", skip_serializing_if = "Option::is_none")]
    sent_to_converter: Option<String>,
    #[serde(
        rename = "receivedFromPluginTStamp",
        skip_serializing_if = "Option::is_none"
    )]
    received_from_plugin: Option<String>,
    #[serde(
        rename = "convertedProductionTStamp",
        skip_serializing_if = "Option::is_none"
    )]
    converter_production: Option<String>,
    #[serde(rename = "sentToBsdbTStamp", skip_serializing_if = "Option::is_none")]
    sent_to_bsdb: Option<String>,
    #[serde(rename = "readFromBsdbTStamp", skip_serializing_if = "Option::is_none")]
    read_from_bsdb: Option<String>,
    #[serde(rename = "dasuProductionTStamp", skip_serializing_if = "Option::is_none")]
    dasu_production: Option<String>,
    #[serde(rename = "depsFullRunningIds", skip_serializing_if = "Option::is_none")]
    deps_full_running_ids: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    props: Option<BTreeMap<String, String>>,
}

/// Renders an epoch-millisecond timestamp as wire ISO-8601.
fn to_iso(ms: u64) -> String {
    #[allow(clippy::cast_possible_wrap)]
    let dt = DateTime::<Utc>::from_timestamp_millis(ms as i64)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    dt.format(ISO8601).to_string()
}

/// Parses a wire ISO-8601 timestamp back to epoch milliseconds.
fn from_iso(s: &str) -> Result<u64, CodecError> {
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|_| CodecError::BadTimestamp(s.to_string()))?;
    let ms = naive.and_utc().timestamp_millis();
    u64::try_from(ms).map_err(|_| CodecError::BadTimestamp(s.to_string()))
}

/// Encodes a value to its wire JSON string.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] when JSON serialization fails
/// (which only happens on non-UTF8-representable content).
pub fn encode(value: &IasValue) -> Result<String, CodecError> {
    let wire = WireValue {
        full_running_id: value.full_running_id.clone(),
        value_type: value.value_type.as_str().to_string(),
        value: value.payload.render(),
        mode: value.mode,
        ias_validity: value.validity,
        plugin_production: value.plugin_production.map(to_iso),
        sent_to_converter: value.sent_to_converter.map(to_iso),
        received_from_plugin: value.received_from_plugin.map(to_iso),
        converter_production: value.converter_production.map(to_iso),
        sent_to_bsdb: value.sent_to_bsdb.map(to_iso),
        read_from_bsdb: value.read_from_bsdb.map(to_iso),
        dasu_production: value.dasu_production.map(to_iso),
        deps_full_running_ids: value.dependents.clone(),
        props: value.props.clone(),
    };
    Ok(serde_json::to_string(&wire)?)
}

/// Decodes a wire JSON string back to a value.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] for invalid JSON,
/// [`CodecError::UnknownType`] for an unrecognized tag,
/// [`CodecError::InvalidValue`] when the payload does not parse as the
/// tagged type or the record violates a value invariant, and
/// [`CodecError::BadTimestamp`] for unparseable timestamps.
pub fn decode(json: &str) -> Result<IasValue, CodecError> {
    let wire: WireValue = serde_json::from_str(json)?;
    let value_type = IasValueType::parse(&wire.value_type)
        .ok_or_else(|| CodecError::UnknownType(wire.value_type.clone()))?;
    let payload = Payload::parse(value_type, &wire.value)?;

    let mut value = IasValue::new(wire.full_running_id, payload, wire.mode, wire.ias_validity)?;
    if let Some(ts) = wire.plugin_production.as_deref().map(from_iso).transpose()? {
        value = value.with_plugin_production(ts)?;
    }
    value.sent_to_converter = wire.sent_to_converter.as_deref().map(from_iso).transpose()?;
    value.received_from_plugin = wire
        .received_from_plugin
        .as_deref()
        .map(from_iso)
        .transpose()?;
    value.converter_production = wire
        .converter_production
        .as_deref()
        .map(from_iso)
        .transpose()?;
    value.sent_to_bsdb = wire.sent_to_bsdb.as_deref().map(from_iso).transpose()?;
    value.read_from_bsdb = wire.read_from_bsdb.as_deref().map(from_iso).transpose()?;
    if let Some(ts) = wire.dasu_production.as_deref().map(from_iso).transpose()? {
        value = value.with_dasu_production(ts)?;
    }
    if let Some(deps) = wire.deps_full_running_ids {
        value = value.with_dependents(deps);
    }
    if let Some(props) = wire.props {
        value = value.with_props(props);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Priority;

    fn base() -> IasValue {
        IasValue::new(
            "(S:SUPERVISOR)@(D:DASU)@(A:ASCE)@(Temp:IASIO)",
            Payload::Alarm(Priority::SetMedium),
            OperationalMode::Operational,
            Validity::Reliable,
        )
        .unwrap()
    }

    #[test]
    fn test_round_trip_minimal() {
        let v = base();
        assert_eq!(decode(&encode(&v).unwrap()).unwrap(), v);
    }

    #[test]
    fn test_round_trip_with_every_optional() {
        let mut v = base().with_dasu_production(1_600_000_000_000).unwrap();
        v.sent_to_converter = Some(1);
        v.received_from_plugin = Some(2_000);
        v.converter_production = Some(3_000);
        v = v.with_sent_to_bsdb(4_000).with_read_from_bsdb(5_000);
        v = v.with_dependents(
            ["(A:ASCE)@(In1:IASIO)".to_string(), "(A:ASCE)@(In2:IASIO)".to_string()]
                .into_iter()
                .collect(),
        );
        v = v.with_props(
            [("actualValue".to_string(), "99.5".to_string())]
                .into_iter()
                .collect(),
        );
        assert_eq!(decode(&encode(&v).unwrap()).unwrap(), v);
    }

    #[test]
    fn test_round_trip_each_payload_kind() {
        for payload in [
            Payload::Long(9),
            Payload::Double(0.25),
            Payload::Boolean(false),
            Payload::Char('q'),
            Payload::String("free text".into()),
            Payload::Timestamp(77),
            Payload::ArrayOfLong(vec![3, 1]),
            Payload::ArrayOfDouble(vec![2.5]),
        ] {
            let v = IasValue::new("Id", payload, OperationalMode::Degraded, Validity::Unreliable)
                .unwrap();
            assert_eq!(decode(&encode(&v).unwrap()).unwrap(), v);
        }
    }

    #[test]
    fn test_absent_optionals_are_omitted() {
        let json = encode(&base()).unwrap();
        assert!(!json.contains("TStamp"));
        assert!(!json.contains("depsFullRunningIds"));
        assert!(!json.contains("props"));
        assert!(!json.contains("null"));
    }

    #[test]
    fn test_timestamp_wire_format() {
        let v = base().with_dasu_production(0).unwrap();
        let json = encode(&v).unwrap();
        assert!(json.contains(r#""dasuProductionTStamp":"1970-01-01T00:00:00.000""#));
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        assert!(matches!(decode("{oops"), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let json = r#"{"fullRunningId":"X","valueType":"BLOB","value":"1","mode":"OPERATIONAL","iasValidity":"RELIABLE"}"#;
        assert!(matches!(decode(json), Err(CodecError::UnknownType(_))));
    }

    #[test]
    fn test_decode_rejects_payload_mismatch() {
        let json = r#"{"fullRunningId":"X","valueType":"LONG","value":"not-a-number","mode":"OPERATIONAL","iasValidity":"RELIABLE"}"#;
        assert!(matches!(decode(json), Err(CodecError::InvalidValue(_))));
    }

    #[test]
    fn test_decode_rejects_double_production() {
        let json = r#"{"fullRunningId":"X","valueType":"LONG","value":"1","mode":"OPERATIONAL","iasValidity":"RELIABLE","pluginProductionTStamp":"1970-01-01T00:00:01.000","dasuProductionTStamp":"1970-01-01T00:00:02.000"}"#;
        assert!(matches!(decode(json), Err(CodecError::InvalidValue(_))));
    }

    #[test]
    fn test_decode_rejects_bad_timestamp() {
        let json = r#"{"fullRunningId":"X","valueType":"LONG","value":"1","mode":"OPERATIONAL","iasValidity":"RELIABLE","sentToBsdbTStamp":"yesterday"}"#;
        assert!(matches!(decode(json), Err(CodecError::BadTimestamp(_))));
    }
}

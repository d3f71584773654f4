//! Structured codec
//!
//! Carries values plain JSON cannot represent (dates, maps, sets,
//! `undefined`, `NaN`, infinities, `-0`, big integers, regular expressions)
//! inside a JSON-safe envelope:
//!
//! ```json
//! {
//!   "json": { "resetDate": "2024-06-01T00:00:00.000Z", "tags": ["a"] },
//!   "meta": { "values": { ".resetDate": "Date", ".tags": "set" } }
//! }
//! ```
//!
//! `json` holds the plain projection of the value and `meta.values` maps the
//! path of every node that needs reconstruction to its tag. Only annotated
//! paths are rewritten on decode, so user data that merely looks like an
//! escaped form (a string `"NaN"`, an array of pairs) is never misread.
//!
//! Decoding comes in three strengths:
//!
//! - [`decode`] is strict and reports every problem as a [`CodecError`].
//! - [`decode_lenient`] falls back to the raw text as a string.
//! - [`decode_field`] tells apart text that is not an envelope at all from an
//!   envelope that is broken, which is what input decoding needs.

mod path;
mod value;

pub use value::RichValue;

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::trace;

const TAG_UNDEFINED: &str = "undefined";
const TAG_NUMBER: &str = "number";
const TAG_BIGINT: &str = "bigint";
const TAG_DATE: &str = "Date";
const TAG_REGEXP: &str = "regexp";
const TAG_MAP: &str = "map";
const TAG_SET: &str = "set";

/// Failure to decode an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("document is not a structured envelope")]
    NotAnEnvelope,

    #[error("invalid annotation path '{0}'")]
    InvalidPath(String),

    #[error("annotation path '{0}' does not address a value")]
    MissingPath(String),

    #[error("unknown type tag '{tag}' at '{path}'")]
    UnknownTag { path: String, tag: String },

    #[error("value at '{path}' cannot be restored as {tag}: {reason}")]
    InvalidValue {
        path: String,
        tag: String,
        reason: String,
    },
}

/// Outcome of decoding one input field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDecode {
    /// A valid envelope
    Decoded(RichValue),
    /// Text that is not an envelope; kept as a plain string
    Raw(String),
    /// An envelope whose annotations cannot be applied
    Malformed(CodecError),
}

/// Encode a value as an envelope string.
pub fn encode(value: &RichValue) -> String {
    let mut annotations = BTreeMap::new();
    let json = to_json(value, "", &mut annotations);

    let mut envelope = Map::new();
    envelope.insert("json".to_string(), json);
    if !annotations.is_empty() {
        let values = annotations
            .into_iter()
            .map(|(path, tag)| (path, Value::String(tag.to_string())))
            .collect();
        let mut meta = Map::new();
        meta.insert("values".to_string(), Value::Object(values));
        envelope.insert("meta".to_string(), Value::Object(meta));
    }
    Value::Object(envelope).to_string()
}

/// Decode an envelope string, failing on anything malformed.
pub fn decode(raw: &str) -> Result<RichValue, CodecError> {
    let document: Value =
        serde_json::from_str(raw).map_err(|e| CodecError::InvalidJson(e.to_string()))?;
    decode_document(document)
}

/// Decode an envelope string, treating any failure as an opaque string.
pub fn decode_lenient(raw: &str) -> RichValue {
    decode(raw).unwrap_or_else(|err| {
        trace!(error = %err, "Falling back to raw string");
        RichValue::String(raw.to_string())
    })
}

/// Decode one input field.
///
/// Text that does not parse as a JSON object with a `json` member is
/// [`FieldDecode::Raw`]; an envelope-shaped object that fails to decode is
/// [`FieldDecode::Malformed`].
pub fn decode_field(raw: &str) -> FieldDecode {
    let document = match serde_json::from_str::<Value>(raw) {
        Ok(document) if is_envelope_shaped(&document) => document,
        _ => return FieldDecode::Raw(raw.to_string()),
    };
    match decode_document(document) {
        Ok(value) => FieldDecode::Decoded(value),
        Err(err) => FieldDecode::Malformed(err),
    }
}

fn is_envelope_shaped(document: &Value) -> bool {
    document
        .as_object()
        .is_some_and(|fields| fields.contains_key("json"))
}

fn decode_document(document: Value) -> Result<RichValue, CodecError> {
    let Value::Object(mut fields) = document else {
        return Err(CodecError::NotAnEnvelope);
    };
    let json = fields.remove("json").ok_or(CodecError::NotAnEnvelope)?;
    let meta = fields.remove("meta");
    if !fields.is_empty() {
        return Err(CodecError::NotAnEnvelope);
    }

    let mut annotations = Vec::new();
    match meta {
        None | Some(Value::Null) => {}
        Some(Value::Object(mut meta)) => match meta.remove("values") {
            None | Some(Value::Null) => {}
            Some(Value::Object(values)) => {
                for (raw_path, tag) in values {
                    let Value::String(tag) = tag else {
                        return Err(CodecError::UnknownTag {
                            path: raw_path,
                            tag: tag.to_string(),
                        });
                    };
                    annotations.push((path::parse(&raw_path)?, raw_path, tag));
                }
            }
            Some(_) => return Err(CodecError::NotAnEnvelope),
        },
        Some(_) => return Err(CodecError::NotAnEnvelope),
    }

    // Deepest first: a node is rebuilt only after everything beneath it.
    annotations.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut value = RichValue::from(json);
    for (segments, raw_path, tag) in annotations {
        let node = locate(&mut value, &segments)
            .ok_or_else(|| CodecError::MissingPath(raw_path.clone()))?;
        let current = std::mem::replace(node, RichValue::Null);
        *node = restore(current, &raw_path, &tag)?;
    }
    Ok(value)
}

fn locate<'a>(value: &'a mut RichValue, segments: &[String]) -> Option<&'a mut RichValue> {
    let Some((first, rest)) = segments.split_first() else {
        return Some(value);
    };
    let child = match value {
        RichValue::Object(fields) => fields.get_mut(first)?,
        RichValue::Array(items) => items.get_mut(first.parse::<usize>().ok()?)?,
        _ => return None,
    };
    locate(child, rest)
}

fn restore(node: RichValue, path: &str, tag: &str) -> Result<RichValue, CodecError> {
    let invalid = |reason: &str| CodecError::InvalidValue {
        path: path.to_string(),
        tag: tag.to_string(),
        reason: reason.to_string(),
    };

    match tag {
        TAG_UNDEFINED => match node {
            RichValue::Null => Ok(RichValue::Undefined),
            _ => Err(invalid("expected null")),
        },
        TAG_NUMBER => match node.as_str() {
            Some("NaN") => Ok(RichValue::Number(f64::NAN)),
            Some("Infinity") => Ok(RichValue::Number(f64::INFINITY)),
            Some("-Infinity") => Ok(RichValue::Number(f64::NEG_INFINITY)),
            Some("-0") => Ok(RichValue::Number(-0.0)),
            _ => Err(invalid("expected NaN, Infinity, -Infinity or -0")),
        },
        TAG_BIGINT => node
            .as_str()
            .and_then(|s| s.parse::<i128>().ok())
            .map(RichValue::BigInt)
            .ok_or_else(|| invalid("expected a decimal integer string")),
        TAG_DATE => node
            .as_str()
            .and_then(value::parse_date)
            .map(RichValue::Date)
            .ok_or_else(|| invalid("expected an RFC 3339 timestamp")),
        TAG_REGEXP => node
            .as_str()
            .and_then(|s| s.strip_prefix('/'))
            .and_then(|s| s.rsplit_once('/'))
            .map(|(source, flags)| RichValue::RegExp {
                source: source.to_string(),
                flags: flags.to_string(),
            })
            .ok_or_else(|| invalid("expected a /source/flags literal")),
        TAG_MAP => match node {
            RichValue::Array(pairs) => pairs
                .into_iter()
                .map(|pair| match pair {
                    RichValue::Array(kv) if kv.len() == 2 => {
                        let mut kv = kv.into_iter();
                        match (kv.next(), kv.next()) {
                            (Some(k), Some(v)) => Ok((k, v)),
                            _ => Err(invalid("expected [key, value] pairs")),
                        }
                    }
                    _ => Err(invalid("expected [key, value] pairs")),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(RichValue::Map),
            _ => Err(invalid("expected an array of pairs")),
        },
        TAG_SET => match node {
            RichValue::Array(members) => Ok(RichValue::Set(members)),
            _ => Err(invalid("expected an array")),
        },
        other => Err(CodecError::UnknownTag {
            path: path.to_string(),
            tag: other.to_string(),
        }),
    }
}

fn to_json(value: &RichValue, at: &str, annotations: &mut BTreeMap<String, &'static str>) -> Value {
    match value {
        RichValue::Undefined => {
            annotations.insert(at.to_string(), TAG_UNDEFINED);
            Value::Null
        }
        RichValue::Null => Value::Null,
        RichValue::Bool(b) => Value::Bool(*b),
        RichValue::Number(n) => match value::number_to_json(*n) {
            Some(json) if !is_negative_zero(*n) => json,
            _ => {
                annotations.insert(at.to_string(), TAG_NUMBER);
                Value::String(special_number(*n).to_string())
            }
        },
        RichValue::BigInt(i) => {
            annotations.insert(at.to_string(), TAG_BIGINT);
            Value::String(i.to_string())
        }
        RichValue::String(s) => Value::String(s.clone()),
        RichValue::Date(d) => {
            annotations.insert(at.to_string(), TAG_DATE);
            Value::String(value::format_date(d))
        }
        RichValue::RegExp { source, flags } => {
            annotations.insert(at.to_string(), TAG_REGEXP);
            Value::String(value::format_regexp(source, flags))
        }
        RichValue::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| to_json(item, &path::push_index(at, i), annotations))
                .collect(),
        ),
        RichValue::Set(members) => {
            annotations.insert(at.to_string(), TAG_SET);
            Value::Array(
                members
                    .iter()
                    .enumerate()
                    .map(|(i, member)| to_json(member, &path::push_index(at, i), annotations))
                    .collect(),
            )
        }
        RichValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, field)| {
                    let child = path::push_segment(at, key);
                    (key.clone(), to_json(field, &child, annotations))
                })
                .collect(),
        ),
        RichValue::Map(entries) => {
            annotations.insert(at.to_string(), TAG_MAP);
            Value::Array(
                entries
                    .iter()
                    .enumerate()
                    .map(|(i, (k, v))| {
                        let pair = path::push_index(at, i);
                        Value::Array(vec![
                            to_json(k, &path::push_index(&pair, 0), annotations),
                            to_json(v, &path::push_index(&pair, 1), annotations),
                        ])
                    })
                    .collect(),
            )
        }
    }
}

fn is_negative_zero(n: f64) -> bool {
    n == 0.0 && n.is_sign_negative()
}

/// Text form of a number JSON cannot carry: non-finite values and `-0`.
fn special_number(n: f64) -> &'static str {
    if n.is_nan() {
        "NaN"
    } else if n == f64::INFINITY {
        "Infinity"
    } else if n == f64::NEG_INFINITY {
        "-Infinity"
    } else {
        "-0"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use serde_json::json;

    fn envelope(raw: &str) -> Value {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_plain_values_have_no_meta() {
        let value = RichValue::from(json!({ "a": 1, "b": ["x", true, null] }));
        assert_eq!(
            envelope(&encode(&value)),
            json!({ "json": { "a": 1, "b": ["x", true, null] } })
        );
    }

    #[test]
    fn test_annotations() {
        let date = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let value = RichValue::object([
            ("resetDate", RichValue::Date(date)),
            ("ratio", RichValue::Number(f64::NAN)),
            ("tags", RichValue::Set(vec!["a".into()])),
            ("a.b", RichValue::Undefined),
        ]);
        assert_eq!(
            envelope(&encode(&value)),
            json!({
                "json": {
                    "resetDate": "2024-06-01T00:00:00.000Z",
                    "ratio": "NaN",
                    "tags": ["a"],
                    "a.b": null,
                },
                "meta": { "values": {
                    ".resetDate": "Date",
                    ".ratio": "number",
                    ".tags": "set",
                    ".a\\.b": "undefined",
                }},
            })
        );
    }

    #[test]
    fn test_map_children_are_annotated_through_pairs() {
        let date = Utc.with_ymd_and_hms(2020, 1, 1, 12, 0, 0).unwrap();
        let value = RichValue::Map(vec![(RichValue::Date(date), RichValue::BigInt(-7))]);
        let encoded = encode(&value);
        assert_eq!(
            envelope(&encoded)["meta"]["values"],
            json!({ "": "map", ".0.0": "Date", ".0.1": "bigint" })
        );
        assert_eq!(decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_lookalike_user_data_is_untouched() {
        let value = RichValue::object([
            ("n", RichValue::from("NaN")),
            ("d", RichValue::from("2024-06-01T00:00:00.000Z")),
            ("pairs", RichValue::from(json!([["k", "v"]]))),
        ]);
        assert_eq!(decode(&encode(&value)).unwrap(), value);
    }

    #[test]
    fn test_special_numbers() {
        for n in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.0, 0.0, 1.5, 1e300] {
            let value = RichValue::Number(n);
            assert_eq!(decode(&encode(&value)).unwrap(), value, "{}", n);
        }
    }

    #[test]
    fn test_root_scalars() {
        let regexp = RichValue::RegExp {
            source: "a/b+".to_string(),
            flags: "gi".to_string(),
        };
        for value in [RichValue::Undefined, RichValue::BigInt(i128::MIN), regexp] {
            assert_eq!(decode(&encode(&value)).unwrap(), value);
        }
    }

    #[test]
    fn test_strict_decode_errors() {
        assert!(matches!(decode("not json"), Err(CodecError::InvalidJson(_))));
        assert_eq!(decode("[1]"), Err(CodecError::NotAnEnvelope));
        assert_eq!(decode(r#"{"json":1,"extra":2}"#), Err(CodecError::NotAnEnvelope));
        assert!(matches!(
            decode(r#"{"json":1,"meta":{"values":{"":"Date"}}}"#),
            Err(CodecError::InvalidValue { .. })
        ));
        assert!(matches!(
            decode(r#"{"json":"x","meta":{"values":{"":"symbol"}}}"#),
            Err(CodecError::UnknownTag { .. })
        ));
        assert_eq!(
            decode(r#"{"json":{},"meta":{"values":{".missing":"Date"}}}"#),
            Err(CodecError::MissingPath(".missing".to_string()))
        );
    }

    #[test]
    fn test_dates_keep_sub_millisecond_precision() {
        let date = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let encoded = encode(&RichValue::Date(date));
        assert_eq!(
            envelope(&encoded)["json"],
            json!("2023-11-14T22:13:20.123456789Z")
        );
        assert_eq!(decode(&encoded), Ok(RichValue::Date(date)));
    }

    #[test]
    fn test_dates_outside_four_digit_years() {
        for year in [10_000, 262_000, -1, -4_000] {
            let date = NaiveDate::from_ymd_opt(year, 2, 28)
                .unwrap()
                .and_hms_milli_opt(13, 5, 7, 250)
                .unwrap()
                .and_utc();
            let value = RichValue::Date(date);
            assert_eq!(decode(&encode(&value)), Ok(value), "year {}", year);
        }
        assert!(matches!(
            decode(r#"{"json":"+10000-13-01T00:00:00.000Z","meta":{"values":{"":"Date"}}}"#),
            Err(CodecError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_lenient_decode_falls_back() {
        assert_eq!(decode_lenient("hello"), RichValue::from("hello"));
        assert_eq!(decode_lenient(r#"{"json":42}"#), RichValue::from(42));
    }

    #[test]
    fn test_field_decode_classification() {
        assert_eq!(decode_field("hello"), FieldDecode::Raw("hello".to_string()));
        assert_eq!(decode_field("42"), FieldDecode::Raw("42".to_string()));
        assert_eq!(
            decode_field(r#"{"other":1}"#),
            FieldDecode::Raw(r#"{"other":1}"#.to_string())
        );
        assert_eq!(
            decode_field(r#"{"json":"x"}"#),
            FieldDecode::Decoded(RichValue::from("x"))
        );
        assert!(matches!(
            decode_field(r#"{"json":"yesterday","meta":{"values":{"":"Date"}}}"#),
            FieldDecode::Malformed(_)
        ));
    }
}

//! The value model carried by the structured codec.

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A value richer than plain JSON.
///
/// Equality is deep. `NaN` equals `NaN` and `-0` differs from `0`, so that a
/// value always equals its own round trip through the codec.
#[derive(Debug, Clone)]
pub enum RichValue {
    /// An absent value, distinct from `null`
    Undefined,
    Null,
    Bool(bool),
    /// Any IEEE-754 double, including `NaN`, infinities and `-0`
    Number(f64),
    /// Integers outside the range a double represents exactly
    BigInt(i128),
    String(String),
    /// A UTC instant. Sub-millisecond parts survive the codec.
    Date(DateTime<Utc>),
    RegExp { source: String, flags: String },
    Array(Vec<RichValue>),
    /// String-keyed record
    Object(BTreeMap<String, RichValue>),
    /// Insertion-ordered map with arbitrary keys
    Map(Vec<(RichValue, RichValue)>),
    /// Insertion-ordered set
    Set(Vec<RichValue>),
}

impl RichValue {
    /// Build an object from `(key, value)` pairs.
    ///
    /// ```rust,ignore
    /// let usage = RichValue::object([
    ///     ("categoriesUsed", RichValue::from(2)),
    ///     ("resetDate", RichValue::from(reset_date)),
    /// ]);
    /// ```
    pub fn object<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<RichValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Short name of the variant, used in log fields and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::BigInt(_) => "bigint",
            Self::String(_) => "string",
            Self::Date(_) => "date",
            Self::RegExp { .. } => "regexp",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Map(_) => "map",
            Self::Set(_) => "set",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[RichValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Field of an object, if this is one.
    pub fn get(&self, key: &str) -> Option<&RichValue> {
        match self {
            Self::Object(fields) => fields.get(key),
            _ => None,
        }
    }

    /// Project onto plain JSON for typed deserialization.
    ///
    /// Dates become RFC 3339 strings, regular expressions their `/source/flags`
    /// literal, sets become arrays and maps whose keys are all strings become
    /// objects (other maps become arrays of pairs). Undefined object fields
    /// are dropped, other undefined values and non-finite numbers become
    /// `null`, and big integers become numbers when they fit an `i64`.
    pub fn to_plain_json(&self) -> Value {
        match self {
            Self::Undefined | Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => number_to_json(*n).unwrap_or(Value::Null),
            Self::BigInt(i) => match i64::try_from(*i) {
                Ok(small) => Value::from(small),
                Err(_) => Value::String(i.to_string()),
            },
            Self::String(s) => Value::String(s.clone()),
            Self::Date(d) => Value::String(format_date(d)),
            Self::RegExp { source, flags } => Value::String(format_regexp(source, flags)),
            Self::Array(items) | Self::Set(items) => {
                Value::Array(items.iter().map(Self::to_plain_json).collect())
            }
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .filter(|(_, v)| !v.is_undefined())
                    .map(|(k, v)| (k.clone(), v.to_plain_json()))
                    .collect(),
            ),
            Self::Map(entries) => {
                if entries.iter().all(|(k, _)| matches!(k, Self::String(_))) {
                    Value::Object(
                        entries
                            .iter()
                            .filter(|(_, v)| !v.is_undefined())
                            .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.to_plain_json())))
                            .collect(),
                    )
                } else {
                    Value::Array(
                        entries
                            .iter()
                            .map(|(k, v)| Value::Array(vec![k.to_plain_json(), v.to_plain_json()]))
                            .collect(),
                    )
                }
            }
        }
    }
}

/// Finite numbers as JSON, integral values without a fractional part.
/// `-0` comes out as `0`.
pub(crate) fn number_to_json(n: f64) -> Option<Value> {
    const MAX_SAFE: f64 = 9_007_199_254_740_992.0;
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() < MAX_SAFE {
        return Some(Value::from(n as i64));
    }
    serde_json::Number::from_f64(n).map(Value::Number)
}

/// RFC 3339 text in UTC. Whole milliseconds print three fraction digits,
/// anything finer prints nine. Years outside `0..=9999` carry a sign.
pub(crate) fn format_date(date: &DateTime<Utc>) -> String {
    let precision = if date.timestamp_subsec_nanos() % 1_000_000 == 0 {
        SecondsFormat::Millis
    } else {
        SecondsFormat::Nanos
    };
    date.to_rfc3339_opts(precision, true)
}

/// Inverse of [`format_date`]. Also accepts any RFC 3339 offset.
pub(crate) fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }

    // Signed years: `+10000-01-01T00:00:00.000Z`, `-0001-...`
    let (sign, rest) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };
    let (year, rest) = rest.split_once('-')?;
    if year.len() < 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (month, rest) = rest.split_once('-')?;
    let (day, time) = rest.split_once('T')?;
    let time = time.strip_suffix('Z')?;

    let date = NaiveDate::from_ymd_opt(
        sign * year.parse::<i32>().ok()?,
        month.parse().ok()?,
        day.parse().ok()?,
    )?;
    let time = NaiveTime::parse_from_str(time, "%H:%M:%S%.f").ok()?;
    Some(date.and_time(time).and_utc())
}

pub(crate) fn format_regexp(source: &str, flags: &str) -> String {
    format!("/{}/{}", source, flags)
}

impl PartialEq for RichValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => {
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
            }
            (Self::BigInt(a), Self::BigInt(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (
                Self::RegExp { source, flags },
                Self::RegExp {
                    source: other_source,
                    flags: other_flags,
                },
            ) => source == other_source && flags == other_flags,
            (Self::Array(a), Self::Array(b)) | (Self::Set(a), Self::Set(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Value> for RichValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_f64() {
                Some(f) => Self::Number(f),
                None => Self::String(n.to_string()),
            },
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(fields) => {
                Self::Object(fields.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<()> for RichValue {
    fn from(_: ()) -> Self {
        Self::Undefined
    }
}

impl From<bool> for RichValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

macro_rules! impl_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for RichValue {
                fn from(n: $t) -> Self {
                    Self::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(f64, f32, i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl From<i128> for RichValue {
    fn from(n: i128) -> Self {
        Self::BigInt(n)
    }
}

impl From<&str> for RichValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for RichValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<DateTime<Utc>> for RichValue {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}

impl<T: Into<RichValue>> From<Option<T>> for RichValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<RichValue>> From<Vec<T>> for RichValue {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<V: Into<RichValue>> From<BTreeMap<String, V>> for RichValue {
    fn from(fields: BTreeMap<String, V>) -> Self {
        Self::Object(fields.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<K: Into<RichValue>, V: Into<RichValue>> From<HashMap<K, V>> for RichValue {
    fn from(entries: HashMap<K, V>) -> Self {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<T: Into<RichValue>> From<BTreeSet<T>> for RichValue {
    fn from(members: BTreeSet<T>) -> Self {
        Self::Set(members.into_iter().map(Into::into).collect())
    }
}

//! Datum - ReQL's JSON-like data type.
//!
//! A `Datum` represents any literal value that can travel inside a query or
//! come back in a response. It is JSON plus three pseudo-types that the wire
//! protocol encodes as objects tagged with `$reql_type$`:
//!
//! - **Time**: `{"$reql_type$": "TIME", "epoch_time": 1.5e9, "timezone": "+00:00"}`
//! - **Binary**: `{"$reql_type$": "BINARY", "data": "<base64>"}`
//! - **Geometry**: `{"$reql_type$": "GEOMETRY", "type": "Point", "coordinates": [..]}`
//!
//! Responses may also carry `GROUPED_DATA`, which is converted to an array of
//! `{group, reduction}` objects when the group format is native.
//!
//! Objects are kept in a `BTreeMap`, so encoding the same datum twice always
//! produces the same bytes.
//!
//! # Example
//!
//! ```rust
//! use reql_client::reql::Datum;
//! use std::collections::BTreeMap;
//!
//! let mut obj = BTreeMap::new();
//! obj.insert("name".to_string(), Datum::from("Alice"));
//! obj.insert("age".to_string(), Datum::from(30));
//! let doc = Datum::Object(obj);
//! assert_eq!(doc.get("age").and_then(Datum::as_number), Some(30.0));
//! ```

use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, FixedOffset, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Marker key of a pseudo-type object.
pub const REQL_TYPE_KEY: &str = "$reql_type$";

/// Largest integer an f64 holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Datum represents a value in ReQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Array(Vec<Datum>),
    Object(BTreeMap<String, Datum>),
    Time(DateTime<FixedOffset>),
    Binary(Vec<u8>),
    /// GeoJSON body of a GEOMETRY pseudo-type, without the marker key.
    Geometry(Value),
}

/// How pseudo-types in responses are presented to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Convert to the native representation (`Datum::Time`, `Datum::Binary`, ...)
    #[default]
    Native,
    /// Leave the `$reql_type$` object untouched
    Raw,
}

/// Decoding settings for response values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeOptions {
    pub time_format: Format,
    pub binary_format: Format,
    pub group_format: Format,
}

impl Datum {
    /// Build a binary datum
    pub fn binary<B: Into<Vec<u8>>>(bytes: B) -> Self {
        Datum::Binary(bytes.into())
    }

    /// Check if datum is null
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Get as string
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Datum::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Datum::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as array
    pub fn as_array(&self) -> Option<&Vec<Datum>> {
        match self {
            Datum::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Get as object
    pub fn as_object(&self) -> Option<&BTreeMap<String, Datum>> {
        match self {
            Datum::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Datum::Time(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Datum::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Field lookup on an object datum
    pub fn get(&self, key: &str) -> Option<&Datum> {
        self.as_object().and_then(|obj| obj.get(key))
    }

    /// Plain JSON form. Pseudo-types become `$reql_type$` objects.
    pub fn to_json(&self) -> Value {
        match self {
            Datum::Null => Value::Null,
            Datum::Boolean(b) => Value::Bool(*b),
            Datum::Number(n) => number_to_json(*n),
            Datum::String(s) => Value::String(s.clone()),
            Datum::Array(arr) => Value::Array(arr.iter().map(Datum::to_json).collect()),
            Datum::Object(obj) => Value::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            _ => self.pseudo_to_json(|v| v.clone()),
        }
    }

    /// Query form. Same as [`Datum::to_json`] except that every array is
    /// wrapped as `[MAKE_ARRAY, [...]]`, because a bare JSON array in a query
    /// is read as a term.
    pub fn to_wire(&self) -> Value {
        match self {
            Datum::Array(arr) => serde_json::json!([
                super::TermType::MakeArray.to_u64(),
                arr.iter().map(Datum::to_wire).collect::<Vec<_>>()
            ]),
            Datum::Object(obj) => Value::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), v.to_wire()))
                    .collect(),
            ),
            Datum::Geometry(_) => self.pseudo_to_json(wrap_arrays),
            _ => self.to_json(),
        }
    }

    fn pseudo_to_json(&self, geometry: impl Fn(&Value) -> Value) -> Value {
        let mut obj = Map::new();
        match self {
            Datum::Time(t) => {
                obj.insert(REQL_TYPE_KEY.into(), Value::from("TIME"));
                obj.insert("epoch_time".into(), number_to_json(epoch_seconds(t)));
                obj.insert("timezone".into(), Value::from(t.offset().to_string()));
            }
            Datum::Binary(bytes) => {
                obj.insert(REQL_TYPE_KEY.into(), Value::from("BINARY"));
                obj.insert("data".into(), Value::from(BASE64.encode(bytes)));
            }
            Datum::Geometry(geo) => {
                if let Value::Object(fields) = geo {
                    for (k, v) in fields {
                        obj.insert(k.clone(), geometry(v));
                    }
                }
                obj.insert(REQL_TYPE_KEY.into(), Value::from("GEOMETRY"));
            }
            _ => return self.to_json(),
        }
        Value::Object(obj)
    }

    /// Decode a response value, honoring the requested pseudo-type formats.
    pub fn from_wire(value: Value, opts: &DecodeOptions) -> Result<Datum> {
        match value {
            Value::Array(arr) => Ok(Datum::Array(
                arr.into_iter()
                    .map(|v| Datum::from_wire(v, opts))
                    .collect::<Result<Vec<_>>>()?,
            )),
            Value::Object(obj) => match pseudo_type(&obj).as_deref() {
                Some("TIME") if opts.time_format == Format::Native => decode_time(&obj),
                Some("BINARY") if opts.binary_format == Format::Native => decode_binary(&obj),
                Some("GROUPED_DATA") if opts.group_format == Format::Native => {
                    decode_grouped(obj, opts)
                }
                Some("GEOMETRY") => {
                    let mut geo = obj;
                    geo.remove(REQL_TYPE_KEY);
                    Ok(Datum::Geometry(Value::Object(geo)))
                }
                _ => Ok(Datum::Object(
                    obj.into_iter()
                        .map(|(k, v)| Datum::from_wire(v, opts).map(|d| (k, d)))
                        .collect::<Result<BTreeMap<_, _>>>()?,
                )),
            },
            other => Ok(Datum::from(other)),
        }
    }

    /// Deserialize into any serde type via its JSON form.
    pub fn deserialize_into<T: DeserializeOwned>(self) -> Result<T> {
        serde_json::from_value(self.to_json())
            .map_err(|e| Error::Client(format!("cannot decode result: {}", e)))
    }
}

fn pseudo_type(obj: &Map<String, Value>) -> Option<String> {
    obj.get(REQL_TYPE_KEY)
        .and_then(Value::as_str)
        .map(str::to_owned)
}

fn number_to_json(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn wrap_arrays(value: &Value) -> Value {
    match value {
        Value::Array(arr) => serde_json::json!([
            super::TermType::MakeArray.to_u64(),
            arr.iter().map(wrap_arrays).collect::<Vec<_>>()
        ]),
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), wrap_arrays(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn epoch_seconds(t: &DateTime<FixedOffset>) -> f64 {
    t.timestamp() as f64 + f64::from(t.timestamp_subsec_nanos()) / 1e9
}

/// Parse a `+HH:MM` / `-HH:MM` / `Z` timezone string.
pub fn parse_timezone(tz: &str) -> Option<FixedOffset> {
    if tz == "Z" {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match tz.as_bytes().first()? {
        b'+' => (1, &tz[1..]),
        b'-' => (-1, &tz[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: u8 = hours.parse().ok()?;
    let minutes: u8 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (i32::from(hours) * 3600 + i32::from(minutes) * 60))
}

fn decode_time(obj: &Map<String, Value>) -> Result<Datum> {
    let epoch = obj
        .get("epoch_time")
        .and_then(Value::as_f64)
        .ok_or_else(|| Error::Client("TIME pseudo-type without epoch_time".into()))?;
    let tz = obj
        .get("timezone")
        .and_then(Value::as_str)
        .unwrap_or("+00:00");
    let offset = parse_timezone(tz)
        .ok_or_else(|| Error::Client(format!("invalid timezone in TIME pseudo-type: {}", tz)))?;

    let secs = epoch.floor();
    let nanos = (((epoch - secs) * 1e9).round() as u32).min(999_999_999);
    let utc = DateTime::<Utc>::from_timestamp(secs as i64, nanos)
        .ok_or_else(|| Error::Client(format!("TIME out of range: {}", epoch)))?;
    Ok(Datum::Time(utc.with_timezone(&offset)))
}

fn decode_binary(obj: &Map<String, Value>) -> Result<Datum> {
    let data = obj
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Client("BINARY pseudo-type without data".into()))?;
    BASE64
        .decode(data)
        .map(Datum::Binary)
        .map_err(|e| Error::Client(format!("invalid base64 in BINARY pseudo-type: {}", e)))
}

fn decode_grouped(mut obj: Map<String, Value>, opts: &DecodeOptions) -> Result<Datum> {
    let data = match obj.remove("data") {
        Some(Value::Array(rows)) => rows,
        _ => return Err(Error::Client("GROUPED_DATA pseudo-type without data".into())),
    };
    let mut groups = Vec::with_capacity(data.len());
    for row in data {
        let mut pair = match row {
            Value::Array(pair) if pair.len() == 2 => pair,
            other => {
                return Err(Error::Client(format!(
                    "malformed GROUPED_DATA entry: {}",
                    other
                )))
            }
        };
        let reduction = Datum::from_wire(pair.pop().unwrap_or(Value::Null), opts)?;
        let group = Datum::from_wire(pair.pop().unwrap_or(Value::Null), opts)?;
        let mut entry = BTreeMap::new();
        entry.insert("group".to_string(), group);
        entry.insert("reduction".to_string(), reduction);
        groups.push(Datum::Object(entry));
    }
    Ok(Datum::Array(groups))
}

impl Serialize for Datum {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Datum {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Datum::from)
    }
}

// Conversions
impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Datum::Boolean(b)
    }
}

impl From<i32> for Datum {
    fn from(n: i32) -> Self {
        Datum::Number(f64::from(n))
    }
}

impl From<i64> for Datum {
    fn from(n: i64) -> Self {
        Datum::Number(n as f64)
    }
}

impl From<u32> for Datum {
    fn from(n: u32) -> Self {
        Datum::Number(f64::from(n))
    }
}

impl From<u64> for Datum {
    fn from(n: u64) -> Self {
        Datum::Number(n as f64)
    }
}

impl From<usize> for Datum {
    fn from(n: usize) -> Self {
        Datum::Number(n as f64)
    }
}

impl From<f64> for Datum {
    fn from(n: f64) -> Self {
        Datum::Number(n)
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Datum::String(s)
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::String(s.to_string())
    }
}

impl From<Vec<Datum>> for Datum {
    fn from(items: Vec<Datum>) -> Self {
        Datum::Array(items)
    }
}

impl From<BTreeMap<String, Datum>> for Datum {
    fn from(obj: BTreeMap<String, Datum>) -> Self {
        Datum::Object(obj)
    }
}

impl From<DateTime<FixedOffset>> for Datum {
    fn from(t: DateTime<FixedOffset>) -> Self {
        Datum::Time(t)
    }
}

impl From<DateTime<Utc>> for Datum {
    fn from(t: DateTime<Utc>) -> Self {
        Datum::Time(t.fixed_offset())
    }
}

impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Datum::Null)
    }
}

impl From<Value> for Datum {
    /// Pseudo-type objects are recognized; malformed ones stay plain objects.
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Datum::Null,
            Value::Bool(b) => Datum::Boolean(b),
            Value::Number(n) => Datum::Number(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => Datum::String(s),
            Value::Array(arr) => Datum::Array(arr.into_iter().map(Datum::from).collect()),
            Value::Object(obj) => {
                if obj.contains_key(REQL_TYPE_KEY) {
                    if let Ok(datum) = Datum::from_wire(
                        Value::Object(obj.clone()),
                        &DecodeOptions::default(),
                    ) {
                        return datum;
                    }
                }
                Datum::Object(
                    obj.into_iter()
                        .map(|(k, v)| (k, Datum::from(v)))
                        .collect(),
                )
            }
        }
    }
}

impl From<Datum> for Value {
    fn from(datum: Datum) -> Self {
        datum.to_json()
    }
}

impl std::fmt::Display for Datum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Datum::Null => write!(f, "null"),
            Datum::Boolean(b) => write!(f, "{}", b),
            Datum::Number(n) => write!(f, "{}", n),
            Datum::String(s) => write!(f, "\"{}\"", s),
            Datum::Array(arr) => {
                write!(f, "[")?;
                for (i, item) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Datum::Object(obj) => {
                write!(f, "{{")?;
                for (i, (key, value)) in obj.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{}\": {}", key, value)?;
                }
                write!(f, "}}")
            }
            Datum::Time(t) => write!(f, "{}", t.to_rfc3339()),
            Datum::Binary(b) => write!(f, "<binary, {} bytes>", b.len()),
            Datum::Geometry(g) => write!(f, "{}", g),
        }
    }
}

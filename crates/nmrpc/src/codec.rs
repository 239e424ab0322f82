//! # Codec
//!
//! The translation layer between local argument values and the `{type, value}`
//! pairs the plugin understands.
//!
//! ## Invariants
//! - **No native dates**: dates travel as UTC strings with millisecond precision,
//!   and `parse_date(format_date(d)) == d` for any `d` truncated to milliseconds.
//! - **References, not values**: remote objects are sent by id, callbacks by index.
//! - **Lenient numbers**: inbound numbers may arrive as JSON numbers or numeric strings.

use chrono::DateTime;
use chrono::NaiveDateTime;
use chrono::TimeZone;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;

use crate::error::Error;
use crate::error::Result;

/// Wire format for dates.
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Identifier of an object living inside the plugin process.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "obj-{}", self.0)
    }
}

// ============================================================================
//  OUTBOUND
// ============================================================================

/// An argument after local resolution, ready to be put on the wire.
///
/// Callbacks have already been registered by the caller and are represented by
/// their table index.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(DateTime<Utc>),
    Object(ObjectId),
    Callback(u64),
}

/// The `type` tag of an outbound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    Object,
}

/// One entry of a request's `params` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    #[serde(rename = "type")]
    pub kind: ParamKind,
    pub value: Json,
}

impl Param {
    /// Reads the parameter back as an integer (numbers and object ids).
    pub fn as_i64(&self) -> Option<i64> {
        self.value.as_i64()
    }

    /// Reads the parameter back as a string.
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    /// Reads the parameter back as an object reference.
    pub fn as_object(&self) -> Option<ObjectId> {
        match self.kind {
            ParamKind::Object => self.value.as_u64().map(ObjectId),
            _ => None,
        }
    }
}

/// Encodes one argument into its wire parameter.
pub fn encode_arg(arg: &Arg) -> Param {
    match arg {
        Arg::String(s) => Param { kind: ParamKind::String, value: Json::from(s.as_str()) },
        Arg::Int(n) => Param { kind: ParamKind::Number, value: Json::from(*n) },
        Arg::Float(n) => Param { kind: ParamKind::Number, value: Json::from(*n) },
        Arg::Bool(b) => Param { kind: ParamKind::Boolean, value: Json::from(*b) },
        Arg::Date(d) => Param { kind: ParamKind::String, value: Json::from(format_date(d)) },
        Arg::Object(id) => Param { kind: ParamKind::Object, value: Json::from(id.0) },
        Arg::Callback(index) => Param { kind: ParamKind::Number, value: Json::from(*index) },
    }
}

/// Formats a date the way the plugin expects: `2024-01-31T09:05:07.042Z`.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parses a date produced by `format_date`.
pub fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, DATE_FORMAT)
        .map_err(|_| Error::InvalidDate(s.to_string()))?;
    Ok(Utc.from_utc_datetime(&naive))
}

// ============================================================================
//  INBOUND
// ============================================================================

/// A return value as it appears on the wire (`retval`).
///
/// The `type` tag is kept as a string here so that an unknown tag fails only the
/// call it belongs to, not the decoding of the whole frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireValue {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Json,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,
}

impl WireValue {
    pub fn string(s: impl Into<String>) -> Self {
        Self::scalar("string", Json::from(s.into()))
    }

    pub fn number(n: i64) -> Self {
        Self::scalar("number", Json::from(n))
    }

    pub fn boolean(b: bool) -> Self {
        Self::scalar("boolean", Json::from(b))
    }

    /// The "no value" marker.
    pub fn none() -> Self {
        Self::scalar("OK", Json::Null)
    }

    pub fn object(descriptor: &ObjectDescriptor) -> Self {
        Self {
            kind: "object".into(),
            value: Json::from(descriptor.id.0),
            properties: Some(descriptor.properties.clone()),
            methods: Some(descriptor.methods.clone()),
        }
    }

    fn scalar(kind: &str, value: Json) -> Self {
        Self { kind: kind.into(), value, properties: None, methods: None }
    }
}

/// Shape of a remote object: its id and the members it declares.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectDescriptor {
    pub id: ObjectId,
    pub properties: Vec<String>,
    pub methods: Vec<String>,
}

/// A decoded return value, before any proxy is built around objects.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    None,
    String(String),
    Number(i64),
    Boolean(bool),
    Object(ObjectDescriptor),
}

/// Decodes a wire return value.
pub fn decode_value(wire: &WireValue) -> Result<Decoded> {
    match wire.kind.as_str() {
        "object" => {
            let id = wire.value.as_u64()
                .or_else(|| wire.value.as_str().and_then(|s| s.trim().parse().ok()))
                .ok_or_else(|| invalid("object", &wire.value))?;
            Ok(Decoded::Object(ObjectDescriptor {
                id: ObjectId(id),
                properties: wire.properties.clone().unwrap_or_default(),
                methods: wire.methods.clone().unwrap_or_default(),
            }))
        }
        "string" => match &wire.value {
            Json::String(s) => Ok(Decoded::String(s.clone())),
            Json::Null => Ok(Decoded::String(String::new())),
            other => Ok(Decoded::String(other.to_string())),
        },
        "number" => decode_number(&wire.value).map(Decoded::Number),
        "boolean" => Ok(Decoded::Boolean(truthy(&wire.value))),
        "OK" | "none" => Ok(Decoded::None),
        other => Err(Error::UnknownValueKind(other.to_string())),
    }
}

/// Integers are read the way the plugin's own page script reads them: JSON
/// numbers are truncated, strings are parsed from their leading integer.
fn decode_number(value: &Json) -> Result<i64> {
    match value {
        Json::Number(n) => n.as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .ok_or_else(|| invalid("number", value)),
        Json::String(s) => leading_int(s).ok_or_else(|| invalid("number", value)),
        _ => Err(invalid("number", value)),
    }
}

fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let end = s.char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()?;
    s[..end].parse().ok()
}

fn truthy(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Json::String(s) => !s.is_empty(),
        Json::Array(_) | Json::Object(_) => true,
    }
}

fn invalid(kind: &str, value: &Json) -> Error {
    Error::InvalidValue { kind: kind.to_string(), value: value.to_string() }
}

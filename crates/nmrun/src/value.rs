//! Local values exchanged with remote objects.

use chrono::DateTime;
use chrono::Utc;

use crate::bridge::Error;
use crate::bridge::Result;
use crate::callback::Callback;
use crate::proxy::RemoteObject;

/// A value passed to, or returned from, the plugin.
#[derive(Debug, Clone)]
pub enum Value {
    /// The "no value" result of setters and void methods.
    None,
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(DateTime<Utc>),
    Object(RemoteObject),
    Callback(Callback),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::String(_) => "string",
            Self::Int(_) | Self::Float(_) => "number",
            Self::Bool(_) => "boolean",
            Self::Date(_) => "date",
            Self::Object(_) => "object",
            Self::Callback(_) => "function",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&RemoteObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Dates come back from the plugin as strings in the wire date format.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(*d),
            Self::String(s) => nmrpc::parse_date(s).ok(),
            _ => None,
        }
    }

    pub fn into_string(self) -> Result<String> {
        match self {
            Self::String(s) => Ok(s),
            other => Err(other.unexpected("string")),
        }
    }

    pub fn into_i64(self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(n),
            other => Err(other.unexpected("number")),
        }
    }

    pub fn into_bool(self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(b),
            other => Err(other.unexpected("boolean")),
        }
    }

    pub fn into_object(self) -> Result<RemoteObject> {
        match self {
            Self::Object(o) => Ok(o),
            other => Err(other.unexpected("object")),
        }
    }

    fn unexpected(&self, expected: &'static str) -> Error {
        Error::UnexpectedValue { expected, found: self.kind() }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Self::String(s.to_string()) }
}

impl From<String> for Value {
    fn from(s: String) -> Self { Self::String(s) }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self { Self::Int(n) }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self { Self::Int(n as i64) }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self { Self::Float(n) }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self { Self::Bool(b) }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self { Self::Date(d) }
}

impl From<RemoteObject> for Value {
    fn from(o: RemoteObject) -> Self { Self::Object(o) }
}

impl From<&RemoteObject> for Value {
    fn from(o: &RemoteObject) -> Self { Self::Object(o.clone()) }
}

impl From<Callback> for Value {
    fn from(c: Callback) -> Self { Self::Callback(c) }
}

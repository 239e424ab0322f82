//! # Error Definitions
//!
//! Failures of the wire protocol itself, and the failure payload a plugin sends back.

/// Operational failures while encoding or decoding frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The payload was not valid JSON, or did not fit the expected shape.
    Json(String),
    /// A frame was missing a field the protocol requires.
    MissingField(&'static str),
    /// A return value carried a `type` tag we do not know.
    UnknownValueKind(String),
    /// A return value's payload does not match its `type` tag.
    InvalidValue { kind: String, value: String },
    /// A date string was not in `YYYY-MM-DDTHH:MM:SS.mmmZ` form.
    InvalidDate(String),
    /// The internal structure of the message was malformed.
    ProtocolViolation(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(msg) => write!(f, "malformed json frame: {}", msg),
            Self::MissingField(field) => write!(f, "frame is missing field '{}'", field),
            Self::UnknownValueKind(kind) => write!(f, "unknown value type '{}'", kind),
            Self::InvalidValue { kind, value } => write!(f, "value {} is not a valid {}", value, kind),
            Self::InvalidDate(s) => write!(f, "invalid date string '{}'", s),
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self { Self::Json(e.to_string()) }
}

/// A specialized Result type for wire operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The "error" side of a response: the plugin refused or failed the operation.
///
/// Distinct from `Error`, which means we could not understand the frame at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub message: String,
}

impl Failure {
    /// Message the plugin sends when the page's origin is not in its trusted list.
    pub const UNTRUSTED_SITE: &'static str = "Untrusted sites disabled in group policy";

    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    /// True if the plugin rejected the call because the site is not trusted.
    pub fn is_untrusted_site(&self) -> bool {
        self.message == Self::UNTRUSTED_SITE
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

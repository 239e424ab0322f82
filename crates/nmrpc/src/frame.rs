//! # Protocol Frames
//!
//! Defines the request and response envelopes exchanged with the plugin.
//!
//! ## Invariants
//! - **Panic Safety**: All decoding paths return `Result`, never panicking on unknown data.
//! - **Broadcast tolerance**: Messages that are neither responses nor callback
//!   invocations decode to `Frame::Ignored`; the channel carries unrelated traffic,
//!   including the page's own requests.
//! - **Forward Compatibility**: Unknown fields are skipped.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;

use crate::codec::ObjectId;
use crate::codec::Param;
use crate::codec::WireValue;
use crate::error::Error;
use crate::error::Failure;
use crate::error::Result;

// ============================================================================
//  REQUESTS
// ============================================================================

/// What a request asks the plugin to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Invoke a method on the target object.
    CallMethod { name: String, params: Vec<Param> },
    /// Read a property of the target object.
    GetProperty { name: String },
    /// Write a property of the target object.
    SetProperty { name: String, value: Param },
    /// Create the root plugin object for this page.
    Init { url: Option<String> },
    /// Release every object the plugin holds for this page.
    Reset { url: Option<String> },
}

impl Operation {
    /// Short label for logs, e.g. `call-method SignHash`.
    pub fn label(&self) -> String {
        match self {
            Self::CallMethod { name, .. } => format!("call-method {}", name),
            Self::GetProperty { name } => format!("get-property {}", name),
            Self::SetProperty { name, .. } => format!("set-property {}", name),
            Self::Init { .. } => "init".to_string(),
            Self::Reset { .. } => "reset".to_string(),
        }
    }
}

/// An outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub destination: String,
    pub request_id: u64,
    pub object: Option<ObjectId>,
    pub operation: Operation,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawRequest {
    destination: String,
    requestid: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    objid: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    get_property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    set_property: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Vec<Param>>,
}

impl Request {
    pub fn new(destination: impl Into<String>, request_id: u64, object: Option<ObjectId>, operation: Operation) -> Self {
        Self { destination: destination.into(), request_id, object, operation }
    }

    /// Serializes the request into the JSON bytes posted on the channel.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut raw = RawRequest {
            destination: self.destination.clone(),
            requestid: self.request_id,
            objid: self.object,
            ..RawRequest::default()
        };

        match &self.operation {
            Operation::CallMethod { name, params } => {
                raw.method = Some(name.clone());
                raw.params = Some(params.clone());
            }
            Operation::GetProperty { name } => {
                raw.get_property = Some(name.clone());
            }
            Operation::SetProperty { name, value } => {
                raw.set_property = Some(name.clone());
                raw.params = Some(vec![value.clone()]);
            }
            Operation::Init { url } => {
                raw.kind = Some("init".into());
                raw.url = url.clone();
            }
            Operation::Reset { url } => {
                raw.kind = Some("reset".into());
                raw.url = url.clone();
            }
        }

        Ok(serde_json::to_vec(&raw)?)
    }

    /// Parses a request; this is the plugin side of the protocol.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let raw: RawRequest = serde_json::from_slice(bytes)?;

        let operation = if let Some(name) = raw.method {
            Operation::CallMethod { name, params: raw.params.unwrap_or_default() }
        } else if let Some(name) = raw.get_property {
            Operation::GetProperty { name }
        } else if let Some(name) = raw.set_property {
            let value = raw.params
                .and_then(|p| p.into_iter().next())
                .ok_or(Error::MissingField("params"))?;
            Operation::SetProperty { name, value }
        } else {
            match raw.kind.as_deref() {
                Some("init") => Operation::Init { url: raw.url },
                Some("reset") => Operation::Reset { url: raw.url },
                Some(other) => {
                    return Err(Error::ProtocolViolation(format!("unknown request type '{}'", other)));
                }
                None => return Err(Error::MissingField("method")),
            }
        };

        Ok(Self {
            destination: raw.destination,
            request_id: raw.requestid,
            object: raw.objid,
            operation,
        })
    }
}

// ============================================================================
//  RESPONSES
// ============================================================================

/// The success payload of a response.
///
/// Method and property calls answer with `retval`; `init` and `reset` answer
/// with a bare `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub request_id: u64,
    pub retval: Option<WireValue>,
    pub value: Option<Json>,
}

impl Reply {
    /// The object id carried by an `init` reply.
    pub fn object_id(&self) -> Result<ObjectId> {
        self.value.as_ref()
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .map(ObjectId)
            .ok_or(Error::MissingField("value"))
    }
}

/// A decoded response addressed to one request id.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub request_id: u64,
    pub outcome: std::result::Result<Reply, Failure>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawResponse {
    requestid: u64,
    #[serde(rename = "type")]
    outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retval: Option<WireValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl Response {
    /// A successful response carrying a return value.
    pub fn result(request_id: u64, retval: WireValue) -> Self {
        Self {
            request_id,
            outcome: Ok(Reply { request_id, retval: Some(retval), value: None }),
        }
    }

    /// A successful response carrying a bare value (`init`, `reset`).
    pub fn bare(request_id: u64, value: Json) -> Self {
        Self {
            request_id,
            outcome: Ok(Reply { request_id, retval: None, value: Some(value) }),
        }
    }

    /// A failed response.
    pub fn error(request_id: u64, message: impl Into<String>) -> Self {
        Self { request_id, outcome: Err(Failure::new(message)) }
    }

    /// Serializes the response inside the envelope the extension wraps it in.
    pub fn encode(&self, tab_id: u64) -> Result<Vec<u8>> {
        let raw = match &self.outcome {
            Ok(reply) => RawResponse {
                requestid: self.request_id,
                outcome: "result".into(),
                retval: reply.retval.clone(),
                value: reply.value.clone(),
                message: None,
            },
            Err(failure) => RawResponse {
                requestid: self.request_id,
                outcome: "error".into(),
                retval: None,
                value: None,
                message: Some(failure.message.clone()),
            },
        };
        let envelope = serde_json::json!({ "tabid": tab_id, "data": raw });
        Ok(serde_json::to_vec(&envelope)?)
    }

    fn from_raw(raw: RawResponse) -> Result<Self> {
        let outcome = match raw.outcome.as_str() {
            "result" => Ok(Reply { request_id: raw.requestid, retval: raw.retval, value: raw.value }),
            "error" => Err(Failure::new(raw.message.unwrap_or_else(|| "unknown plugin error".into()))),
            other => {
                return Err(Error::ProtocolViolation(format!("unknown response type '{}'", other)));
            }
        };
        Ok(Self { request_id: raw.requestid, outcome })
    }
}

/// The plugin invoking a callback the page registered earlier.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackInvocation {
    pub index: u64,
    pub retval: Option<WireValue>,
}

impl CallbackInvocation {
    /// Serializes the invocation; the argument travels as nested JSON text.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let inner = serde_json::json!({ "data": { "retval": self.retval } });
        let outer = serde_json::json!({
            "object": serde_json::to_string(&inner)?,
            "value": self.index,
        });
        Ok(serde_json::to_vec(&outer)?)
    }

    fn from_parts(object: &str, index: u64) -> Result<Self> {
        let inner: Json = serde_json::from_str(object)?;
        let retval = match inner.get("data").and_then(|d| d.get("retval")) {
            Some(Json::Null) | None => None,
            Some(v) => Some(serde_json::from_value(v.clone())?),
        };
        Ok(Self { index, retval })
    }
}

// ============================================================================
//  FRAMES
// ============================================================================

/// Anything that can arrive on the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Response(Response),
    Callback(CallbackInvocation),
    /// Unrelated broadcast traffic, including our own outbound requests.
    Ignored,
}

impl Frame {
    /// Classifies and decodes an inbound message.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let json: Json = serde_json::from_slice(bytes)?;
        let Json::Object(map) = &json else {
            return Ok(Frame::Ignored);
        };

        if map.get("tabid").is_some_and(is_truthy) {
            let Some(data) = map.get("data") else {
                return Err(Error::MissingField("data"));
            };
            let raw: RawResponse = serde_json::from_value(data.clone())?;
            return Ok(Frame::Response(Response::from_raw(raw)?));
        }

        if let (Some(Json::String(object)), Some(index)) = (map.get("object"), map.get("value").and_then(Json::as_u64)) {
            return Ok(Frame::Callback(CallbackInvocation::from_parts(object, index)?));
        }

        Ok(Frame::Ignored)
    }
}

/// Responses are told apart by a tab id that is present and not `0`, `false`,
/// `null` or empty.
fn is_truthy(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Json::String(s) => !s.is_empty(),
        Json::Array(_) | Json::Object(_) => true,
    }
}

/// Extracts just the request id from a response envelope.
///
/// Used to route a failure to the right caller when the full decoding fails.
pub fn peek_request_id(bytes: &[u8]) -> Option<u64> {
    let json: Json = serde_json::from_slice(bytes).ok()?;
    if !json.get("tabid").is_some_and(is_truthy) {
        return None;
    }
    json.get("data")?.get("requestid")?.as_u64()
}

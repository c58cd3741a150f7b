//! JSON-RPC 2.0 message types for host-plugin communication.
//!
//! The protocol is line-delimited: every message is one JSON value on a
//! single UTF-8 line terminated by `\n`. The host writes [`RpcRequest`] lines
//! to a plugin's stdin and reads [`RpcResponse`] lines from its stdout.
//! Plugin stderr is diagnostic text and is never parsed as protocol data.
//!
//! Parsing is deliberately strict about shape: a response must carry a
//! usable `id` and exactly one of `result` or `error`. Anything else is a
//! [`ProtocolViolation`], which the transport logs and drops.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Protocol version string carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// The JSON sent is not a valid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist or is not available.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal or unspecified plugin-side error.
pub const INTERNAL_ERROR: i64 = -32603;

/// Correlation token linking a request to its response.
///
/// The host always allocates numeric ids; string ids are accepted on the
/// wire so that responses from plugins that echo string ids still match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id.
    Number(u64),
    /// String id.
    String(String),
}

impl RequestId {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(Self::Number),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "\"{s}\""),
        }
    }
}

/// A request written to a plugin.
///
/// # Example
///
/// ```
/// use orchestra_plugins::protocol::RpcRequest;
/// use serde_json::json;
///
/// let request = RpcRequest::new(1_u64, "ping", json!({}));
/// assert_eq!(
///     request.to_line().expect("serialise"),
///     "{\"jsonrpc\":\"2.0\",\"method\":\"ping\",\"params\":{},\"id\":1}\n"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRequest {
    jsonrpc: &'static str,
    method: String,
    params: Value,
    id: RequestId,
}

impl RpcRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
            id: id.into(),
        }
    }

    /// Returns the correlation id.
    #[must_use]
    pub const fn id(&self) -> &RequestId {
        &self.id
    }

    /// Returns the method name.
    #[must_use]
    pub const fn method(&self) -> &str {
        self.method.as_str()
    }

    /// Serialises the request as a single newline-terminated line.
    ///
    /// # Errors
    ///
    /// Returns the serialisation error if the parameters cannot be encoded.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Outcome carried by a response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    /// The call succeeded with this result (which may be `null`).
    Result(Value),
    /// The plugin reported an error.
    Error(RpcError),
}

/// A response read from a plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    /// Id of the request being answered.
    pub id: RequestId,
    /// Result or error.
    pub payload: ResponsePayload,
}

/// Any message a plugin may write to its output stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcMessage {
    /// A request or notification initiated by the plugin. The host does not
    /// serve these.
    Request {
        /// Requested method.
        method: String,
        /// Id, absent for notifications.
        id: Option<RequestId>,
    },
    /// A response to a host request.
    Response(RpcResponse),
}

/// Reasons an output line is not a usable protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// The line is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    /// The line is valid JSON but not an object.
    #[error("message is not a JSON object")]
    NotAnObject,
    /// The response has no `id`, or the id is `null`.
    #[error("response has no id")]
    MissingId,
    /// The id is neither a non-negative integer nor a string.
    #[error("response id {0} is not a usable correlation id")]
    UnusableId(String),
    /// Neither `result` nor `error` is present.
    #[error("response has neither result nor error")]
    MissingOutcome,
    /// Both `result` and `error` are present.
    #[error("response has both result and error")]
    AmbiguousOutcome,
    /// The `error` member is not a `{code, message}` object.
    #[error("malformed error object: {0}")]
    InvalidError(String),
}

impl RpcMessage {
    /// Parses one output line.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolViolation`] describing why the line cannot be
    /// used.
    pub fn parse(line: &str) -> Result<Self, ProtocolViolation> {
        let value: Value = serde_json::from_str(line)
            .map_err(|err| ProtocolViolation::InvalidJson(err.to_string()))?;
        let Value::Object(object) = value else {
            return Err(ProtocolViolation::NotAnObject);
        };

        if let Some(Value::String(method)) = object.get("method") {
            let id = object.get("id").and_then(RequestId::from_value);
            return Ok(Self::Request {
                method: method.clone(),
                id,
            });
        }

        parse_response_object(object).map(Self::Response)
    }
}

fn parse_response_object(mut object: Map<String, Value>) -> Result<RpcResponse, ProtocolViolation> {
    let id = match object.get("id") {
        None | Some(Value::Null) => return Err(ProtocolViolation::MissingId),
        Some(raw) => {
            RequestId::from_value(raw).ok_or_else(|| ProtocolViolation::UnusableId(raw.to_string()))?
        }
    };

    let payload = match (object.remove("result"), object.remove("error")) {
        (Some(result), None) => ResponsePayload::Result(result),
        (None, Some(error)) => ResponsePayload::Error(
            serde_json::from_value(error)
                .map_err(|err| ProtocolViolation::InvalidError(err.to_string()))?,
        ),
        (None, None) => return Err(ProtocolViolation::MissingOutcome),
        (Some(_), Some(_)) => return Err(ProtocolViolation::AmbiguousOutcome),
    };

    Ok(RpcResponse { id, payload })
}

#[cfg(test)]
mod tests;

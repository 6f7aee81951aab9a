//! Wire-level JSON-RPC 2.0 model: ids, error codes, response objects, and the
//! structural validation that lifts a decoded payload element into a request
//! frame.
//!
//! The shapes here follow the `jsonrpsee-types` API surface, reimplemented
//! over decoded [`serde_json::Value`]s so that any JSON number id round-trips
//! verbatim instead of being pinned to `u64`.

use crate::registry::Params;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Marker for the `"jsonrpc": "2.0"` version member.  Serializes to exactly
/// that string and refuses anything else on the way in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TwoPointZero;

impl Serialize for TwoPointZero {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for TwoPointZero {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VersionVisitor;

        impl Visitor<'_> for VersionVisitor {
            type Value = TwoPointZero;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("the string \"2.0\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<TwoPointZero, E> {
                if v == "2.0" {
                    Ok(TwoPointZero)
                } else {
                    Err(E::custom(format!("unsupported JSON-RPC version: {v}")))
                }
            }
        }

        deserializer.deserialize_str(VersionVisitor)
    }
}

/// A request id.
///
/// The protocol allows strings and numbers.  `Null` appears in error
/// responses when the originating id could not be determined, and covers the
/// discouraged-but-legal case of a request carrying an explicit `"id": null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Null,
    Num(serde_json::Number),
    Str(String),
}

impl Id {
    /// Lift an id out of a decoded request object.  Returns `None` for JSON
    /// types the protocol does not permit as ids.
    pub(crate) fn from_value(value: Value) -> Option<Id> {
        match value {
            Value::Null => Some(Id::Null),
            Value::Number(n) => Some(Id::Num(n)),
            Value::String(s) => Some(Id::Str(s)),
            _ => None,
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Null => f.write_str("null"),
            Id::Num(n) => write!(f, "{n}"),
            Id::Str(s) => write!(f, "\"{s}\""),
        }
    }
}

/// Canonical JSON-RPC 2.0 error codes.  `ServerError` covers the
/// −32000..−32099 range the protocol reserves for host-defined failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ServerError(i32),
}

impl ErrorCode {
    pub const fn code(&self) -> i32 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::ServerError(code) => *code,
        }
    }

    pub const fn message(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::MethodNotFound => "Method not found",
            ErrorCode::InvalidParams => "Invalid params",
            ErrorCode::InternalError => "Internal error",
            ErrorCode::ServerError(_) => "Server error",
        }
    }
}

/// The `error` member of an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn owned(code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    /// An error object carrying a canonical code and its fixed message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::owned(code.code(), code.message(), None)
    }
}

/// Exactly one of `result` or `error`, flattened into the response object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponsePayload {
    #[serde(rename = "result")]
    Success(Value),
    #[serde(rename = "error")]
    Error(ErrorObject),
}

/// A single JSON-RPC response object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: TwoPointZero,
    #[serde(flatten)]
    pub payload: ResponsePayload,
    pub id: Id,
}

impl Response {
    pub fn success(result: Value, id: Id) -> Self {
        Self {
            jsonrpc: TwoPointZero,
            payload: ResponsePayload::Success(result),
            id,
        }
    }

    pub fn error(error: ErrorObject, id: Id) -> Self {
        Self {
            jsonrpc: TwoPointZero,
            payload: ResponsePayload::Error(error),
            id,
        }
    }
}

/// A structurally valid request lifted out of the decoded payload.
///
/// `id: None` marks a notification, which must never be answered.
#[derive(Debug, Clone)]
pub struct RequestFrame {
    pub id: Option<Id>,
    pub method: String,
    pub params: Params,
}

/// A payload element that failed structural validation, along with whatever
/// id could be recovered from it for the error response.
#[derive(Debug)]
pub(crate) struct Malformed {
    pub id: Id,
}

impl RequestFrame {
    /// Structural validation of a single payload element: it must be an
    /// object carrying `"jsonrpc": "2.0"`, a non-empty string `method`, and a
    /// structured `params` when one is present.  The id is recovered first so
    /// that later failures can still reference it.  Members the protocol does
    /// not define are ignored.
    pub(crate) fn from_value(value: Value) -> Result<Self, Malformed> {
        let Value::Object(mut object) = value else {
            return Err(Malformed { id: Id::Null });
        };

        let id = match object.remove("id") {
            None => None,
            Some(raw) => match Id::from_value(raw) {
                Some(id) => Some(id),
                None => return Err(Malformed { id: Id::Null }),
            },
        };

        match object.get("jsonrpc").and_then(Value::as_str) {
            Some("2.0") => {}
            _ => {
                return Err(Malformed {
                    id: id.unwrap_or(Id::Null),
                })
            }
        }

        let method = match object.remove("method") {
            Some(Value::String(method)) if !method.is_empty() => method,
            _ => {
                return Err(Malformed {
                    id: id.unwrap_or(Id::Null),
                })
            }
        };

        let params = match Params::from_request(object.remove("params")) {
            Ok(params) => params,
            Err(_) => {
                return Err(Malformed {
                    id: id.unwrap_or(Id::Null),
                })
            }
        };

        Ok(RequestFrame { id, method, params })
    }
}

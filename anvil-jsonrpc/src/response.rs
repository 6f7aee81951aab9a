//! Response assembly: mapping pipeline errors to the error objects a client
//! is allowed to see, and serializing single or batched responses to the
//! exact bytes the host should emit.

use crate::error::{RelayPolicy, RpcError};
use crate::shared::{ErrorCode, ErrorObject, Id, Response};
use tracing::*;

/// Hand-assembled last resort for the (should-be-impossible) case where
/// response serialization itself fails.
const FALLBACK_INTERNAL_ERROR: &str =
    r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal error"},"id":null}"#;

/// Map a pipeline error to the error object a client is allowed to see.
///
/// Protocol and dispatch failures carry their fixed codes.  Application
/// failures are relayed verbatim only when their kind passes `policy` and
/// they carry a code; in every other case the client gets the generic
/// internal error and the detail stays in the server log.  That substitution
/// is the information-hiding boundary, and it also applies to relayable
/// kinds that carry no code.
pub fn error_object(error: &RpcError, policy: &RelayPolicy) -> ErrorObject {
    match error {
        RpcError::InvalidRequest => ErrorObject::from_code(ErrorCode::InvalidRequest),
        RpcError::MethodNotFound(method) => ErrorObject::owned(
            ErrorCode::MethodNotFound.code(),
            format!("Method not found: {method}"),
            None,
        ),
        RpcError::InvalidParams(detail) => {
            debug!(detail = %detail, "parameter binding failed");
            ErrorObject::from_code(ErrorCode::InvalidParams)
        }
        RpcError::Application {
            kind,
            code,
            message,
            data,
        } => {
            if let (true, Some(code)) = (policy.is_relayable(kind), code) {
                ErrorObject::owned(*code, message.clone(), data.clone())
            } else {
                error!(
                    kind = %kind,
                    code = ?code,
                    message = %message,
                    "application error withheld from client"
                );
                ErrorObject::from_code(ErrorCode::InternalError)
            }
        }
        RpcError::Internal(source) => {
            error!(error = ?source, "internal error during dispatch");
            ErrorObject::from_code(ErrorCode::InternalError)
        }
    }
}

/// Render a pipeline error into a full response, under the originating
/// request's id when one was recovered.
pub fn render_error(error: &RpcError, id: Id, policy: &RelayPolicy) -> Response {
    Response::error(error_object(error, policy), id)
}

/// Serialize one response to its wire form.
pub fn serialize_response(response: &Response) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        error!(error = %e, id = %response.id, "error serializing response");
        FALLBACK_INTERNAL_ERROR.to_owned()
    })
}

/// Serialize an ordered set of per-element responses.  An empty set means
/// the whole batch was notifications, and the protocol forbids emitting any
/// body for it.
pub fn serialize_batch(responses: &[Response]) -> Option<String> {
    if responses.is_empty() {
        return None;
    }
    Some(serde_json::to_string(responses).unwrap_or_else(|e| {
        error!(error = %e, "error serializing batch response");
        FALLBACK_INTERNAL_ERROR.to_owned()
    }))
}

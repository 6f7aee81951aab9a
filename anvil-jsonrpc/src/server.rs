//! The protocol engine: top-level payload dispatch, the per-request state
//! machine, and batch processing with per-element fault isolation.

use crate::error::{RelayPolicy, RpcError};
use crate::middleware::{Credentials, MiddlewareChain};
use crate::registry::{Params, ProcedureRegistry};
use crate::response;
use crate::shared::{ErrorCode, ErrorObject, Id, RequestFrame, Response};
use serde_json::Value;
use tracing::*;

/// The JSON-RPC 2.0 protocol engine.
///
/// Owns the host-configured procedure registry, middleware chain, and relay
/// policy, and processes one decoded payload per [`Engine::process`] call.
/// The engine holds no state between calls besides that configuration, which
/// it never mutates: configure fully, then serve.  Multiple independently
/// configured engines can coexist in one process.
#[derive(Debug)]
pub struct Engine {
    registry: ProcedureRegistry,
    middleware: MiddlewareChain,
    relay: RelayPolicy,
}

impl Engine {
    pub fn new(
        registry: ProcedureRegistry,
        middleware: MiddlewareChain,
        relay: RelayPolicy,
    ) -> Self {
        Self {
            registry,
            middleware,
            relay,
        }
    }

    /// An engine with no middleware and the default relay-all policy.
    pub fn with_registry(registry: ProcedureRegistry) -> Self {
        Self::new(registry, MiddlewareChain::new(), RelayPolicy::default())
    }

    pub fn registry(&self) -> &ProcedureRegistry {
        &self.registry
    }

    /// Process one decoded payload to one response body.
    ///
    /// Returns `None` exactly when the protocol forbids a response: a single
    /// notification, or a batch consisting only of notifications.
    #[instrument(skip_all)]
    pub async fn process(&self, payload: Value, caller: &Credentials) -> Option<String> {
        match payload {
            Value::Array(batch) => self.process_batch(batch, caller).await,
            Value::Object(_) => {
                let response = self.process_request(payload, caller).await?;
                Some(response::serialize_response(&response))
            }
            other => {
                warn!(payload = %other, "top-level payload is neither an object nor an array");
                let response =
                    response::render_error(&RpcError::InvalidRequest, Id::Null, &self.relay);
                Some(response::serialize_response(&response))
            }
        }
    }

    /// Decode a raw request body and process it.  A JSON syntax error is
    /// answered with the protocol's parse error, which can reference no id.
    pub async fn process_text(&self, body: &str, caller: &Credentials) -> Option<String> {
        match serde_json::from_str::<Value>(body) {
            Ok(payload) => self.process(payload, caller).await,
            Err(e) => {
                warn!(error = %e, "request body is not valid JSON");
                let response =
                    Response::error(ErrorObject::from_code(ErrorCode::ParseError), Id::Null);
                Some(response::serialize_response(&response))
            }
        }
    }

    /// Batch envelope handling.  The emptiness check precedes any element
    /// validation, and elements never affect their siblings: each one is
    /// processed to completion, and only non-notification responses are
    /// collected, in input order.
    async fn process_batch(&self, batch: Vec<Value>, caller: &Credentials) -> Option<String> {
        if batch.is_empty() {
            let response =
                response::render_error(&RpcError::InvalidRequest, Id::Null, &self.relay);
            return Some(response::serialize_response(&response));
        }

        let mut responses = Vec::with_capacity(batch.len());
        for element in batch {
            if let Some(response) = self.process_request(element, caller).await {
                responses.push(response);
            }
        }

        response::serialize_batch(&responses)
    }

    /// The per-request state machine: structural validation, then dispatch,
    /// then response assembly.  Returns `None` for notifications, which are
    /// never answered, not even with their errors.
    async fn process_request(&self, element: Value, caller: &Credentials) -> Option<Response> {
        let frame = match RequestFrame::from_value(element) {
            Ok(frame) => frame,
            Err(malformed) => {
                // a structural failure always answers, under whatever id
                // could be recovered from the element
                return Some(response::render_error(
                    &RpcError::InvalidRequest,
                    malformed.id,
                    &self.relay,
                ));
            }
        };

        let RequestFrame { id, method, params } = frame;

        match self.dispatch(&method, params, caller).await {
            Ok(result) => id.map(|id| Response::success(result, id)),
            Err(error) => match id {
                Some(id) => Some(response::render_error(&error, id, &self.relay)),
                None => {
                    error!(method = %method, error = %error, "error handling notification");
                    None
                }
            },
        }
    }

    /// Registry lookup, then middleware, then invocation; first error wins.
    /// Lookup precedes the middleware run so hooks never observe calls to
    /// procedures that do not exist.
    #[instrument(skip_all, fields(method = %method))]
    async fn dispatch(
        &self,
        method: &str,
        params: Params,
        caller: &Credentials,
    ) -> Result<Value, RpcError> {
        if !self.registry.contains(method) {
            return Err(RpcError::MethodNotFound(method.to_owned()));
        }

        self.middleware.run(method, &params, caller).await?;
        self.registry.invoke(method, params).await
    }
}

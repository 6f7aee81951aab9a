//! Async engine for the server side of JSON-RPC 2.0.
//!
//! `jsonrpsee` is a more full-featured JSON-RPC library, but it couples the
//! server side to its own transports, and its request types borrow from an
//! undecoded input string with ids pinned to `u64`.  This crate instead takes
//! a payload the host has already decoded (a single request object or a
//! batch array) and turns it into the exact response body to emit, leaving
//! transport, credential extraction, and response transmission to the host
//! application.
//!
//! The pieces a host wires together at startup:
//!
//! - [`ProcedureRegistry`]: a name-to-procedure table with three registration
//!   styles (bare callables, bound instance methods, and late-bound
//!   factory-constructed methods)
//! - [`MiddlewareChain`]: ordered pre-dispatch hooks that can abort a single
//!   request (authorization, rate limiting, audit logging)
//! - [`RelayPolicy`]: which application error kinds clients may see verbatim
//! - [`Engine`]: processes payloads against the three above

mod error;
mod middleware;
mod registry;
mod response;
mod server;
mod shared;

pub use error::{RelayPolicy, RpcError, SERVER_ERROR};
pub use middleware::{Credentials, Middleware, MiddlewareChain};
pub use registry::{Params, Procedure, ProcedureRegistry, ProcedureSet};
pub use response::{error_object, render_error, serialize_batch, serialize_response};
pub use server::Engine;
pub use shared::{
    ErrorCode, ErrorObject, Id, RequestFrame, Response, ResponsePayload, TwoPointZero,
};

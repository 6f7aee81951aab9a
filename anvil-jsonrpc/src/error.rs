//! Error taxonomy for the dispatch pipeline, and the relay policy that
//! decides which application failures a client is allowed to see.

use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashSet;

/// Default code for host-defined aborts: the bottom of the −32000..−32099
/// server-error range the protocol reserves for hosts.
pub const SERVER_ERROR: i32 = -32000;

/// An error raised anywhere between structural validation and procedure
/// return.
///
/// Every variant is converted to a response at the processing step that
/// raised it; nothing escapes a `process` call as a raw error.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The payload element failed structural validation before dispatch.
    #[error("invalid request")]
    InvalidRequest,

    /// No procedure is registered under the requested name.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Parameter binding failed.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Host-defined failure from a middleware hook or a procedure body.
    ///
    /// Relayed to the client verbatim only when `kind` passes the engine's
    /// [`RelayPolicy`] and a code is present; otherwise the client sees the
    /// generic internal error.
    #[error("{message}")]
    Application {
        kind: Cow<'static, str>,
        code: Option<i32>,
        message: String,
        data: Option<Value>,
    },

    /// Anything else escaping a procedure body.  Always collapsed to the
    /// generic internal error before it reaches a client.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RpcError {
    /// A host-defined failure.  `code` should normally sit in the protocol's
    /// reserved −32000..−32099 server-error range.
    pub fn application(
        kind: impl Into<Cow<'static, str>>,
        code: impl Into<Option<i32>>,
        message: impl Into<String>,
    ) -> Self {
        RpcError::Application {
            kind: kind.into(),
            code: code.into(),
            message: message.into(),
            data: None,
        }
    }

    /// Attach a `data` member to an application error.  No-op for the other
    /// variants, which carry fixed payloads.
    pub fn with_data(mut self, value: Value) -> Self {
        if let RpcError::Application { ref mut data, .. } = self {
            *data = Some(value);
        }
        self
    }

    /// The conventional middleware abort: kind `"rejected"`, code −32000.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::application("rejected", SERVER_ERROR, message)
    }
}

/// Which application error kinds are exposed to clients verbatim.
///
/// "Relay everything" is itself a configuration rather than a special case,
/// so open and narrowed deployments are expressed uniformly.
#[derive(Debug, Clone, Default)]
pub enum RelayPolicy {
    /// Every application error that carries a code is relayed (the default).
    #[default]
    All,
    /// Only the listed kinds are relayed; everything else collapses to the
    /// generic internal error.
    Kinds(HashSet<String>),
}

impl RelayPolicy {
    /// An allow-list policy over the given kinds.
    pub fn kinds<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RelayPolicy::Kinds(kinds.into_iter().map(Into::into).collect())
    }

    pub fn is_relayable(&self, kind: &str) -> bool {
        match self {
            RelayPolicy::All => true,
            RelayPolicy::Kinds(kinds) => kinds.contains(kind),
        }
    }
}

//! Pre-dispatch middleware: ordered hooks that can abort a request before its
//! procedure runs.

use crate::error::RpcError;
use crate::registry::Params;
use std::fmt;
use std::sync::Arc;

/// Caller identity as decoded by the host transport.
///
/// Passed per `process` call rather than stored on the chain, so one
/// request's identity cannot leak into the next inside a long-lived process.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The empty identity, for hosts that performed no authentication.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}

// the password must never reach logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A single pre-dispatch hook.
///
/// Hooks see the procedure name, its parameters, and the caller identity;
/// they never see or build responses.  Returning an error aborts this request
/// only: later hooks and the procedure itself do not run, and the error is
/// reported through the engine's relay mapping.  Plain closures of the
/// matching `Fn` shape get an implementation for free.
#[async_trait::async_trait]
pub trait Middleware: Send + Sync {
    async fn call(
        &self,
        method: &str,
        params: &Params,
        credentials: &Credentials,
    ) -> Result<(), RpcError>;
}

#[async_trait::async_trait]
impl<F> Middleware for F
where
    F: Fn(&str, &Params, &Credentials) -> Result<(), RpcError> + Send + Sync,
{
    async fn call(
        &self,
        method: &str,
        params: &Params,
        credentials: &Credentials,
    ) -> Result<(), RpcError> {
        (self)(method, params, credentials)
    }
}

/// An ordered list of hooks, run front to back before every dispatch.
#[derive(Default)]
pub struct MiddlewareChain {
    hooks: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook.  Execution order is registration order.
    pub fn add<M: Middleware + 'static>(&mut self, hook: M) {
        self.hooks.push(Arc::new(hook));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook in order.  The first failure short-circuits the chain.
    pub async fn run(
        &self,
        method: &str,
        params: &Params,
        credentials: &Credentials,
    ) -> Result<(), RpcError> {
        for hook in &self.hooks {
            hook.call(method, params, credentials).await?;
        }
        Ok(())
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::Mutex;

    #[tokio::test]
    async fn hooks_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut chain = MiddlewareChain::new();
        for label in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            chain.add(
                move |_method: &str, _params: &Params, _credentials: &Credentials| {
                    seen.lock().unwrap().push(label);
                    Ok(())
                },
            );
        }

        chain
            .run("echo", &Params::None, &Credentials::anonymous())
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn first_failure_short_circuits() {
        let ran_after = Arc::new(Mutex::new(false));

        let mut chain = MiddlewareChain::new();
        chain.add(
            |_method: &str, _params: &Params, _credentials: &Credentials| {
                Err(RpcError::rejected("denied"))
            },
        );
        {
            let ran_after = Arc::clone(&ran_after);
            chain.add(
                move |_method: &str, _params: &Params, _credentials: &Credentials| {
                    *ran_after.lock().unwrap() = true;
                    Ok(())
                },
            );
        }

        let result = chain
            .run("echo", &Params::None, &Credentials::anonymous())
            .await;
        assert_matches!(result, Err(RpcError::Application { message, .. }) if message == "denied");
        assert!(!*ran_after.lock().unwrap());
    }

    #[tokio::test]
    async fn hooks_see_the_caller_identity() {
        let mut chain = MiddlewareChain::new();
        chain.add(
            |_method: &str, _params: &Params, credentials: &Credentials| {
                if credentials.username == "alice" && credentials.password == "sesame" {
                    Ok(())
                } else {
                    Err(RpcError::application("auth", -32001, "unknown caller"))
                }
            },
        );

        chain
            .run("echo", &Params::None, &Credentials::new("alice", "sesame"))
            .await
            .unwrap();

        let denied = chain
            .run("echo", &Params::None, &Credentials::anonymous())
            .await;
        assert_matches!(denied, Err(RpcError::Application { code: Some(-32001), .. }));
    }

    #[test]
    fn debug_redacts_the_password() {
        let credentials = Credentials::new("alice", "sesame");
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("sesame"));
    }

    #[test]
    fn anonymous_identity_is_empty() {
        assert!(Credentials::anonymous().is_anonymous());
        assert!(!Credentials::new("alice", "").is_anonymous());
    }
}

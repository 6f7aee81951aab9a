//! Procedure registry: the name → target table, the three registration
//! styles, and parameter binding.

use crate::error::RpcError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::*;

/// Parameters attached to a request, already shape-checked by structural
/// validation: positional, named, or absent.
///
/// Binding is deliberately lenient: parameters a procedure never reads are
/// ignored rather than rejected, and named binding through [`Params::parse`]
/// inherits serde's ignore-unknown-fields behavior.  A missing required
/// parameter always surfaces as an invalid-params error.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    /// No `params` member was present.
    #[default]
    None,
    /// Positional parameters, bound by index.
    List(Vec<Value>),
    /// Named parameters, bound by key.
    Map(Map<String, Value>),
}

impl Params {
    /// Lift a raw `params` member out of a request object.  A present value
    /// of any unstructured type violates the protocol.
    pub(crate) fn from_request(raw: Option<Value>) -> Result<Self, RpcError> {
        match raw {
            None => Ok(Params::None),
            Some(Value::Array(list)) => Ok(Params::List(list)),
            Some(Value::Object(map)) => Ok(Params::Map(map)),
            Some(_) => Err(RpcError::InvalidRequest),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Params::None => 0,
            Params::List(list) => list.len(),
            Params::Map(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Positional accessor.
    pub fn get(&self, index: usize) -> Option<&Value> {
        match self {
            Params::List(list) => list.get(index),
            _ => None,
        }
    }

    /// Named accessor.
    pub fn named(&self, key: &str) -> Option<&Value> {
        match self {
            Params::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Bind one required parameter, positionally or by name depending on how
    /// the caller supplied params.
    pub fn required<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<T, RpcError> {
        match self.lookup(index, name) {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| RpcError::InvalidParams(format!("parameter `{name}`: {e}"))),
            None => Err(RpcError::InvalidParams(format!(
                "missing required parameter `{name}`"
            ))),
        }
    }

    /// Bind one optional parameter; an absent parameter is `None`.
    pub fn optional<T: DeserializeOwned>(
        &self,
        index: usize,
        name: &str,
    ) -> Result<Option<T>, RpcError> {
        match self.lookup(index, name) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| RpcError::InvalidParams(format!("parameter `{name}`: {e}"))),
            None => Ok(None),
        }
    }

    fn lookup(&self, index: usize, name: &str) -> Option<&Value> {
        match self {
            Params::None => None,
            Params::List(list) => list.get(index),
            Params::Map(map) => map.get(name),
        }
    }

    /// Deserialize the whole params structure into `P`.  Absent params
    /// deserialize from JSON null, so an `Option<P>` target expresses a
    /// procedure whose params are optional as a whole.
    pub fn parse<P: DeserializeOwned>(&self) -> Result<P, RpcError> {
        serde_json::from_value(self.to_value()).map_err(|e| RpcError::InvalidParams(e.to_string()))
    }

    fn to_value(&self) -> Value {
        match self {
            Params::None => Value::Null,
            Params::List(list) => Value::Array(list.clone()),
            Params::Map(map) => Value::Object(map.clone()),
        }
    }
}

/// A single invocable procedure.
///
/// Implement this directly for async handlers; plain closures of the shape
/// `Fn(Params) -> Result<Value, RpcError>` get an implementation for free.
#[async_trait::async_trait]
pub trait Procedure: Send + Sync {
    async fn call(&self, params: Params) -> Result<Value, RpcError>;
}

#[async_trait::async_trait]
impl<F> Procedure for F
where
    F: Fn(Params) -> Result<Value, RpcError> + Send + Sync,
{
    async fn call(&self, params: Params) -> Result<Value, RpcError> {
        (self)(params)
    }
}

/// A set of related procedures exposed by one object and dispatched by name:
/// the unit of bulk registration and of bound or late-bound method targets.
#[async_trait::async_trait]
pub trait ProcedureSet: Send + Sync {
    /// The names this set exposes, consumed by
    /// [`ProcedureRegistry::register_set`].
    fn procedures(&self) -> &'static [&'static str];

    /// Invoke one of the set's procedures.
    async fn dispatch(&self, method: &str, params: Params) -> Result<Value, RpcError>;
}

type SetFactory = dyn Fn() -> Box<dyn ProcedureSet> + Send + Sync;

enum Target {
    Handler(Arc<dyn Procedure>),
    Bound {
        set: Arc<dyn ProcedureSet>,
        method: String,
    },
    Deferred {
        make: Arc<SetFactory>,
        method: String,
    },
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Handler(_) => f.write_str("Handler"),
            Target::Bound { method, .. } => write!(f, "Bound({method})"),
            Target::Deferred { method, .. } => write!(f, "Deferred({method})"),
        }
    }
}

/// Name → target table.  Names are unique; the last registration for a name
/// silently wins.  Holds no mutable state besides the table itself, and is
/// meant to be configured fully before the first request is processed.
#[derive(Debug, Default)]
pub struct ProcedureRegistry {
    table: HashMap<String, Target>,
}

impl ProcedureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a name to a directly invocable procedure.
    pub fn register_callable<P>(&mut self, name: impl Into<String>, procedure: P)
    where
        P: Procedure + 'static,
    {
        self.table
            .insert(name.into(), Target::Handler(Arc::new(procedure)));
    }

    /// Bind a name to a method on a live instance.  The instance is shared
    /// and reused across calls.
    pub fn register_method(
        &mut self,
        name: impl Into<String>,
        set: Arc<dyn ProcedureSet>,
        method: impl Into<String>,
    ) {
        self.table.insert(
            name.into(),
            Target::Bound {
                set,
                method: method.into(),
            },
        );
    }

    /// Bind a name to a method on a receiver that does not exist yet: the
    /// factory runs with no arguments at every call, and the fresh receiver
    /// is dropped when the call returns.
    pub fn register_factory<S, F>(
        &mut self,
        name: impl Into<String>,
        factory: F,
        method: impl Into<String>,
    ) where
        S: ProcedureSet + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        let make: Arc<SetFactory> =
            Arc::new(move || -> Box<dyn ProcedureSet> { Box::new(factory()) });
        self.table.insert(
            name.into(),
            Target::Deferred {
                make,
                method: method.into(),
            },
        );
    }

    /// Bulk-register every procedure a set exposes, each under its own name.
    /// Names under the protocol-reserved `rpc.` prefix are skipped.
    pub fn register_set(&mut self, set: Arc<dyn ProcedureSet>) {
        for name in set.procedures().iter().copied() {
            if name.starts_with("rpc.") {
                warn!(
                    method = name,
                    "skipping reserved method name in bulk registration"
                );
                continue;
            }
            self.table.insert(
                name.to_owned(),
                Target::Bound {
                    set: Arc::clone(&set),
                    method: name.to_owned(),
                },
            );
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Resolve `name` and perform the call.
    pub async fn invoke(&self, name: &str, params: Params) -> Result<Value, RpcError> {
        let target = self
            .table
            .get(name)
            .ok_or_else(|| RpcError::MethodNotFound(name.to_owned()))?;

        match target {
            Target::Handler(procedure) => procedure.call(params).await,
            Target::Bound { set, method } => set.dispatch(method, params).await,
            Target::Deferred { make, method } => {
                let receiver = make();
                receiver.dispatch(method, params).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo_first(params: Params) -> Result<Value, RpcError> {
        params.required::<Value>(0, "value")
    }

    struct Arithmetic {
        calls: AtomicUsize,
    }

    impl Arithmetic {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ProcedureSet for Arithmetic {
        fn procedures(&self) -> &'static [&'static str] {
            &["math.add", "math.mul", "rpc.describe"]
        }

        async fn dispatch(&self, method: &str, params: Params) -> Result<Value, RpcError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let a: i64 = params.required(0, "a")?;
            let b: i64 = params.required(1, "b")?;
            match method {
                "math.add" => Ok(json!(a + b)),
                "math.mul" => Ok(json!(a * b)),
                other => Err(RpcError::MethodNotFound(other.to_owned())),
            }
        }
    }

    #[derive(Default)]
    struct Stateless;

    #[async_trait::async_trait]
    impl ProcedureSet for Stateless {
        fn procedures(&self) -> &'static [&'static str] {
            &["ping"]
        }

        async fn dispatch(&self, _method: &str, _params: Params) -> Result<Value, RpcError> {
            Ok(json!("pong"))
        }
    }

    #[tokio::test]
    async fn invokes_a_registered_callable() {
        let mut registry = ProcedureRegistry::new();
        registry.register_callable("echo", echo_first);

        let result = registry
            .invoke("echo", Params::List(vec![json!("hi")]))
            .await
            .unwrap();
        assert_eq!(result, json!("hi"));
    }

    #[tokio::test]
    async fn unknown_names_are_method_not_found() {
        let registry = ProcedureRegistry::new();
        assert_matches!(
            registry.invoke("nope", Params::None).await,
            Err(RpcError::MethodNotFound(name)) if name == "nope"
        );
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let mut registry = ProcedureRegistry::new();
        registry.register_callable("version", |_params: Params| Ok(json!(1)));
        registry.register_callable("version", |_params: Params| Ok(json!(2)));

        assert_eq!(registry.len(), 1);
        let result = registry.invoke("version", Params::None).await.unwrap();
        assert_eq!(result, json!(2));
    }

    #[tokio::test]
    async fn bulk_registration_skips_reserved_names() {
        let mut registry = ProcedureRegistry::new();
        registry.register_set(Arc::new(Arithmetic::new()));

        assert!(registry.contains("math.add"));
        assert!(registry.contains("math.mul"));
        assert!(!registry.contains("rpc.describe"));

        let result = registry
            .invoke("math.add", Params::List(vec![json!(2), json!(3)]))
            .await
            .unwrap();
        assert_eq!(result, json!(5));
    }

    #[tokio::test]
    async fn bound_instances_are_reused_across_calls() {
        let instance = Arc::new(Arithmetic::new());
        let mut registry = ProcedureRegistry::new();
        let bound: Arc<dyn ProcedureSet> = instance.clone();
        registry.register_method("sum", bound, "math.add");

        for _ in 0..2 {
            registry
                .invoke("sum", Params::List(vec![json!(1), json!(1)]))
                .await
                .unwrap();
        }
        assert_eq!(instance.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn deferred_targets_construct_a_fresh_receiver_per_call() {
        let constructed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&constructed);

        let mut registry = ProcedureRegistry::new();
        registry.register_factory(
            "ping",
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Stateless
            },
            "ping",
        );

        for _ in 0..2 {
            let result = registry.invoke("ping", Params::None).await.unwrap();
            assert_eq!(result, json!("pong"));
        }
        assert_eq!(constructed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn binding_is_positional_or_named() {
        let mut registry = ProcedureRegistry::new();
        registry.register_set(Arc::new(Arithmetic::new()));

        let positional = registry
            .invoke("math.mul", Params::List(vec![json!(4), json!(5)]))
            .await
            .unwrap();
        assert_eq!(positional, json!(20));

        let named = registry
            .invoke(
                "math.mul",
                Params::Map(
                    json!({"a": 4, "b": 5})
                        .as_object()
                        .cloned()
                        .unwrap(),
                ),
            )
            .await
            .unwrap();
        assert_eq!(named, json!(20));
    }

    #[tokio::test]
    async fn extra_parameters_are_ignored() {
        let mut registry = ProcedureRegistry::new();
        registry.register_set(Arc::new(Arithmetic::new()));

        let positional = registry
            .invoke(
                "math.add",
                Params::List(vec![json!(2), json!(3), json!(99)]),
            )
            .await
            .unwrap();
        assert_eq!(positional, json!(5));

        let named = registry
            .invoke(
                "math.add",
                Params::Map(
                    json!({"a": 2, "b": 3, "mode": "fast"})
                        .as_object()
                        .cloned()
                        .unwrap(),
                ),
            )
            .await
            .unwrap();
        assert_eq!(named, json!(5));
    }

    #[tokio::test]
    async fn missing_required_parameters_are_invalid_params() {
        let mut registry = ProcedureRegistry::new();
        registry.register_set(Arc::new(Arithmetic::new()));

        assert_matches!(
            registry
                .invoke(
                    "math.add",
                    Params::Map(json!({"a": 2}).as_object().cloned().unwrap()),
                )
                .await,
            Err(RpcError::InvalidParams(detail)) if detail.contains("`b`")
        );
        assert_matches!(
            registry
                .invoke("math.add", Params::List(vec![json!("two"), json!(3)]))
                .await,
            Err(RpcError::InvalidParams(_))
        );
    }

    #[test]
    fn params_shape_is_enforced() {
        assert_matches!(
            Params::from_request(Some(json!("positional"))),
            Err(RpcError::InvalidRequest)
        );
        assert_matches!(
            Params::from_request(Some(json!(7))),
            Err(RpcError::InvalidRequest)
        );
        assert_eq!(Params::from_request(None).unwrap(), Params::None);
    }

    #[test]
    fn whole_params_parse_is_lenient_about_unknown_keys() {
        #[derive(Debug, serde::Deserialize)]
        struct AddParams {
            a: i64,
            b: i64,
        }

        let params = Params::Map(
            json!({"a": 2, "b": 3, "comment": "ignored"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let bound: AddParams = params.parse().unwrap();
        assert_eq!(bound.a + bound.b, 5);

        let missing = Params::Map(json!({"a": 2}).as_object().cloned().unwrap());
        assert_matches!(missing.parse::<AddParams>(), Err(RpcError::InvalidParams(_)));
    }

    #[test]
    fn accessors_match_the_params_shape() {
        let positional = Params::List(vec![json!("a"), json!("b")]);
        assert_eq!(positional.get(1), Some(&json!("b")));
        assert_eq!(positional.named("b"), None);
        assert_eq!(positional.len(), 2);

        let named = Params::Map(json!({"key": "value"}).as_object().cloned().unwrap());
        assert_eq!(named.named("key"), Some(&json!("value")));
        assert_eq!(named.get(0), None);

        assert!(Params::None.is_empty());
    }

    #[test]
    fn optional_parameters_default_to_none() {
        let params = Params::List(vec![json!(1)]);
        assert_eq!(params.optional::<i64>(0, "a").unwrap(), Some(1));
        assert_eq!(params.optional::<i64>(1, "b").unwrap(), None);
        assert_eq!(Params::None.optional::<i64>(0, "a").unwrap(), None);
    }
}

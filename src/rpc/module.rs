//! Method groups.
//!
//! A group is a namespace plus a set of async handlers. On the wire a method
//! is addressed as `<namespace>_<method>`, e.g. `example_latestHeader`.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::Value;

use crate::rpc::types::{Params, RpcError};

/// Namespace whose groups are only served when explicitly enabled.
pub const ADMIN_NAMESPACE: &str = "admin";

pub type MethodResult = Result<Value, RpcError>;

pub(crate) type Handler = Arc<dyn Fn(Params) -> BoxFuture<'static, MethodResult> + Send + Sync>;

/// A named group of JSON-RPC methods.
#[derive(Clone)]
pub struct RpcModule {
    namespace: String,
    methods: BTreeMap<String, Handler>,
}

impl RpcModule {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            methods: BTreeMap::new(),
        }
    }

    /// Register `name` (without the namespace prefix). Registering the same
    /// name twice replaces the earlier handler.
    pub fn register<F, Fut, T>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RpcError>> + Send + 'static,
        T: Serialize,
    {
        let handler: Handler = Arc::new(move |params: Params| -> BoxFuture<'static, MethodResult> {
            handler(params)
                .map(|result| {
                    result.and_then(|value| {
                        serde_json::to_value(value).map_err(|e| RpcError::Internal(e.to_string()))
                    })
                })
                .boxed()
        });
        self.methods.insert(name.to_string(), handler);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is_admin(&self) -> bool {
        self.namespace == ADMIN_NAMESPACE
    }

    /// Fully-qualified names of every method in the group.
    pub fn method_names(&self) -> Vec<String> {
        self.methods
            .keys()
            .map(|name| format!("{}_{}", self.namespace, name))
            .collect()
    }

    pub(crate) fn into_methods(self) -> impl Iterator<Item = (String, Handler)> {
        let namespace = self.namespace;
        self.methods
            .into_iter()
            .map(move |(name, handler)| (format!("{}_{}", namespace, name), handler))
    }
}

impl std::fmt::Debug for RpcModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcModule")
            .field("namespace", &self.namespace)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_call() {
        let module = RpcModule::new("math").register("double", |params: Params| async move {
            let n: u64 = params.one()?;
            Ok::<_, RpcError>(n * 2)
        });

        assert_eq!(module.method_names(), vec!["math_double".to_string()]);
        assert!(!module.is_admin());

        let (name, handler) = module.into_methods().next().unwrap();
        assert_eq!(name, "math_double");
        let result = handler(Params::new(Some(json!([21])))).await.unwrap();
        assert_eq!(result, json!(42));

        let err = handler(Params::new(None)).await.unwrap_err();
        assert_eq!(err.code(), -32602);
    }

    #[test]
    fn test_admin_namespace() {
        assert!(RpcModule::new(ADMIN_NAMESPACE).is_admin());
        assert!(!RpcModule::new("administrator").is_admin());
    }
}

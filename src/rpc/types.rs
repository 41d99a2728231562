//! JSON-RPC 2.0 wire envelope.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const JSONRPC_VERSION: &str = "2.0";

/// Errors a method (or the dispatcher) can answer with.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("the method {0} does not exist/is not available")]
    MethodNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// Application-level failure reported by a method.
    #[error("{0}")]
    Server(String),
}

impl RpcError {
    pub fn code(&self) -> i64 {
        match self {
            RpcError::Parse(_) => -32700,
            RpcError::InvalidRequest(_) => -32600,
            RpcError::MethodNotFound(_) => -32601,
            RpcError::InvalidParams(_) => -32602,
            RpcError::Internal(_) => -32603,
            RpcError::Server(_) => -32000,
        }
    }
}

/// An incoming call. A missing `id` marks a notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
}

impl From<&RpcError> for ErrorObject {
    fn from(err: &RpcError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    pub id: Value,
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, err: &RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(err.into()),
            id,
        }
    }
}

/// Positional (or by-name) parameters of a call.
#[derive(Debug, Clone, Default)]
pub struct Params(Option<Value>);

impl Params {
    pub fn new(raw: Option<Value>) -> Self {
        Self(raw)
    }

    /// Decode the single argument of a one-argument method.
    ///
    /// Accepts `[arg]` as well as a bare object for by-name callers.
    pub fn one<T: DeserializeOwned>(&self) -> Result<T, RpcError> {
        let value = match &self.0 {
            Some(Value::Array(items)) => match items.as_slice() {
                [single] => single.clone(),
                [] => return Err(missing_argument()),
                _ => {
                    return Err(RpcError::InvalidParams(format!(
                        "too many arguments, want at most 1, got {}",
                        items.len()
                    )))
                }
            },
            Some(Value::Null) | None => return Err(missing_argument()),
            Some(other) => other.clone(),
        };
        serde_json::from_value(value)
            .map_err(|e| RpcError::InvalidParams(format!("invalid argument 0: {}", e)))
    }
}

fn missing_argument() -> RpcError {
    RpcError::InvalidParams("missing value for required argument 0".to_string())
}

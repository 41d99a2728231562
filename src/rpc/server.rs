//! JSON-RPC endpoint.
//!
//! # Responsibilities
//! - Collect the registered method groups, dropping `admin` unless enabled
//! - Serve `POST /` (single call or batch) and `GET /healthz`
//! - Dispatch each call to its handler and wrap the outcome
//!
//! # Design Decisions
//! - Calls in a batch run concurrently; responses keep request order
//! - Notifications (no `id`) run but produce no response

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response as HttpResponse},
    routing::{get, post},
    Json, Router,
};
use futures_util::future::join_all;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::RpcConfig;
use crate::http::{HttpServer, HttpServerError};
use crate::rpc::module::{Handler, RpcModule};
use crate::rpc::types::{Params, Request, Response, RpcError, JSONRPC_VERSION};

/// Largest request body accepted.
const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

struct RpcState {
    version: String,
    methods: HashMap<String, Handler>,
}

/// The JSON-RPC sub-service.
pub struct RpcServer {
    bind: String,
    state: Arc<RpcState>,
    server: Option<HttpServer>,
}

impl RpcServer {
    /// Build the method table. Groups in the admin namespace are only kept
    /// when `config.enable_admin` is set.
    pub fn new(config: &RpcConfig, version: &str, modules: Vec<RpcModule>) -> Self {
        let mut methods = HashMap::new();
        for module in modules {
            let admin = module.is_admin();
            if admin && !config.enable_admin {
                tracing::debug!(namespace = module.namespace(), "Skipping admin RPC group");
                continue;
            }
            if admin {
                tracing::info!("Admin RPC enabled");
            }
            methods.extend(module.into_methods());
        }

        Self {
            bind: config.bind_address(),
            state: Arc::new(RpcState {
                version: version.to_string(),
                methods,
            }),
            server: None,
        }
    }

    /// Whether `method` (fully qualified) will be served.
    pub fn has_method(&self, method: &str) -> bool {
        self.state.methods.contains_key(method)
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", post(handle_rpc))
            .route("/healthz", get(handle_health))
            .with_state(self.state.clone())
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(TraceLayer::new_for_http())
    }

    pub async fn start(&mut self) -> Result<(), HttpServerError> {
        tracing::info!(
            address = %self.bind,
            methods = self.state.methods.len(),
            "Starting JSON-RPC service"
        );
        let server = HttpServer::start("rpc", &self.bind, self.router()).await?;
        tracing::info!(address = %server.addr(), "Started JSON-RPC service");
        self.server = Some(server);
        Ok(())
    }

    /// Bound address once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(HttpServer::addr)
    }

    pub async fn stop(&mut self, ctx: &CancellationToken) -> Result<(), HttpServerError> {
        match self.server.as_mut() {
            Some(server) => server.stop(ctx).await,
            None => Ok(()),
        }
    }
}

async fn handle_health(State(state): State<Arc<RpcState>>) -> Json<Value> {
    Json(json!({ "version": state.version }))
}

async fn handle_rpc(State(state): State<Arc<RpcState>>, body: Bytes) -> HttpResponse {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            let err = RpcError::Parse(e.to_string());
            return Json(Response::failure(Value::Null, &err)).into_response();
        }
    };

    match payload {
        Value::Array(calls) => {
            if calls.is_empty() {
                let err = RpcError::InvalidRequest("empty batch".to_string());
                return Json(Response::failure(Value::Null, &err)).into_response();
            }
            let responses: Vec<Response> = join_all(calls.into_iter().map(|call| dispatch(&state, call)))
                .await
                .into_iter()
                .flatten()
                .collect();
            if responses.is_empty() {
                StatusCode::NO_CONTENT.into_response()
            } else {
                Json(responses).into_response()
            }
        }
        call => match dispatch(&state, call).await {
            Some(response) => Json(response).into_response(),
            None => StatusCode::NO_CONTENT.into_response(),
        },
    }
}

/// Run one call. Returns `None` for notifications.
async fn dispatch(state: &RpcState, call: Value) -> Option<Response> {
    let request: Request = match serde_json::from_value(call) {
        Ok(request) => request,
        Err(e) => {
            let err = RpcError::InvalidRequest(e.to_string());
            return Some(Response::failure(Value::Null, &err));
        }
    };

    let id = request.id.clone();
    let outcome = if request.jsonrpc != JSONRPC_VERSION {
        Err(RpcError::InvalidRequest(format!(
            "unsupported jsonrpc version '{}'",
            request.jsonrpc
        )))
    } else {
        match state.methods.get(&request.method) {
            Some(handler) => handler(Params::new(request.params)).await,
            None => Err(RpcError::MethodNotFound(request.method.clone())),
        }
    };

    if let Err(e) = &outcome {
        tracing::debug!(method = %request.method, error = %e, "RPC call failed");
    }

    let id = id?;
    Some(match outcome {
        Ok(result) => Response::success(id, result),
        Err(e) => Response::failure(id, &e),
    })
}

//! HTTP transport: an axum router on the provider, a reqwest client on the
//! caller.
//!
//! # Routes
//!
//! - `GET  /health`        : liveness plus the registered capabilities
//! - `POST /v1/implements` : `CapabilityRequest` → `ImplementsResponse`
//! - `POST /v1/spec`       : `CapabilityRequest` → `FuncSpec`
//! - `POST /v1/call`       : `CallRequest` → `CallResponse`
//!
//! Failures answer with a non-2xx status and a `RemoteError` body.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use super::server::PluginServer;
use super::transport::{
    CallRequest, CallResponse, CapabilityRequest, ImplementsResponse, Transport,
};
use crate::component::Capability;
use crate::error::{BridgeError, ErrorKind, RemoteError};
use crate::funcspec::{Args, FuncSpec};

// ---------------------------------------------------------------------------
// Provider side
// ---------------------------------------------------------------------------

/// A [`RemoteError`] as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub RemoteError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0.kind {
            ErrorKind::Transport => StatusCode::BAD_GATEWAY,
            ErrorKind::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            ErrorKind::Resolution => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::SpecInconsistency | ErrorKind::Invocation | ErrorKind::Cleanup => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.0)).into_response()
    }
}

/// Build the provider router.
pub fn router(server: Arc<PluginServer>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/implements", post(implements_handler))
        .route("/v1/spec", post(spec_handler))
        .route("/v1/call", post(call_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

/// GET /health: liveness probe.
async fn health_handler(State(server): State<Arc<PluginServer>>) -> impl IntoResponse {
    let mut capabilities: Vec<_> = server
        .registry()
        .capabilities()
        .map(|c| c.to_string())
        .collect();
    capabilities.sort();
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "capabilities": capabilities,
    }))
}

/// POST /v1/implements: capability probe.
async fn implements_handler(
    State(server): State<Arc<PluginServer>>,
    Json(request): Json<CapabilityRequest>,
) -> Json<ImplementsResponse> {
    Json(server.handle_implements(&request))
}

/// POST /v1/spec: function specification.
async fn spec_handler(
    State(server): State<Arc<PluginServer>>,
    Json(request): Json<CapabilityRequest>,
) -> Result<Json<FuncSpec>, ApiError> {
    server.handle_spec(&request).map(Json).map_err(ApiError)
}

/// POST /v1/call: invoke a capability.
///
/// The call runs on its own task. If the client goes away the handler
/// future is dropped and the call's cancellation token fires, but the task
/// still drains the call's ledger.
async fn call_handler(
    State(server): State<Arc<PluginServer>>,
    Json(request): Json<CallRequest>,
) -> Result<Json<CallResponse>, ApiError> {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let task = tokio::spawn(async move { server.handle_call(request, cancel).await });
    let result = task.await.map_err(|e| {
        ApiError(RemoteError::from(&BridgeError::transport(format!(
            "call task failed: {}",
            e
        ))))
    })?;
    guard.disarm();
    result.map(Json).map_err(ApiError)
}

// ---------------------------------------------------------------------------
// Caller side
// ---------------------------------------------------------------------------

/// Transport that talks to a provider [`router`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the provider at `base_url`, e.g. `http://127.0.0.1:7420`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, BridgeError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(BridgeError::transport)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(BridgeError::transport)?;
        if status.is_success() {
            return Ok(serde_json::from_slice(&bytes)?);
        }

        match serde_json::from_slice::<RemoteError>(&bytes) {
            Ok(remote) => Err(BridgeError::Remote(remote)),
            Err(_) => Err(BridgeError::Transport(format!(
                "{} answered {}: {}",
                url,
                status,
                String::from_utf8_lossy(&bytes)
            ))),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn identifier(&self) -> String {
        self.base_url.clone()
    }

    async fn implements(&self, capability: &Capability) -> Result<bool, BridgeError> {
        let response: ImplementsResponse = self
            .post(
                "/v1/implements",
                &CapabilityRequest {
                    capability: capability.clone(),
                },
            )
            .await?;
        Ok(response.implements)
    }

    async fn spec(&self, capability: &Capability) -> Result<FuncSpec, BridgeError> {
        let spec: FuncSpec = self
            .post(
                "/v1/spec",
                &CapabilityRequest {
                    capability: capability.clone(),
                },
            )
            .await?;
        spec.validate()?;
        Ok(spec)
    }

    async fn call(
        &self,
        capability: &Capability,
        args: Args,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        let request = CallRequest::new(capability.clone(), args);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BridgeError::Cancelled),
            response = self.post::<_, CallResponse>("/v1/call", &request) => response.map(|_| ()),
        }
    }
}

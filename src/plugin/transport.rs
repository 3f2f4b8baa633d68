//! The RPC channel between a capability client and a provider.
//!
//! Every capability speaks the same three calls: probe, spec and call. A
//! [`Transport`] carries them; [`LocalTransport`] is the in-process channel
//! and [`HttpTransport`](super::http::HttpTransport) the networked one.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::server::PluginServer;
use crate::component::Capability;
use crate::error::{BridgeError, RemoteError};
use crate::funcspec::{Args, FuncSpec};

// ---------------------------------------------------------------------------
// Wire messages
// ---------------------------------------------------------------------------

/// Body of the probe and spec requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    pub capability: Capability,
}

/// Answer to a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementsResponse {
    pub implements: bool,
}

/// Body of a call request: the caller-supplied arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub capability: Capability,
    /// Correlates client and provider log lines for one call.
    pub call_id: Uuid,
    #[serde(default)]
    pub args: Args,
}

impl CallRequest {
    pub fn new(capability: Capability, args: Args) -> Self {
        Self {
            capability,
            call_id: Uuid::new_v4(),
            args,
        }
    }
}

/// Answer to a successful call. Function results are not carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResponse {
    pub call_id: Uuid,
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// A request/response channel to one provider.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable identifier of the far end, for logs.
    fn identifier(&self) -> String;

    /// Ask whether the provider implements `capability`.
    async fn implements(&self, capability: &Capability) -> Result<bool, BridgeError>;

    /// Fetch the function specification of `capability`.
    async fn spec(&self, capability: &Capability) -> Result<FuncSpec, BridgeError>;

    /// Invoke `capability` with the caller-supplied `args`.
    ///
    /// Firing `cancel` abandons the request; the provider sees the call
    /// cancelled.
    async fn call(
        &self,
        capability: &Capability,
        args: Args,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError>;
}

// ---------------------------------------------------------------------------
// LocalTransport
// ---------------------------------------------------------------------------

/// In-process channel to a [`PluginServer`].
///
/// Every request and response still goes through the JSON codec, so what
/// works here also works over the wire.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    server: Arc<PluginServer>,
}

impl LocalTransport {
    pub fn new(server: Arc<PluginServer>) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &Arc<PluginServer> {
        &self.server
    }
}

/// Encode `value` to JSON and decode it back.
fn roundtrip<T: Serialize + DeserializeOwned>(value: &T) -> Result<T, BridgeError> {
    let bytes = serde_json::to_vec(value)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Carry a handler's answer back through the codec, errors included.
fn remote<T>(result: Result<T, RemoteError>) -> Result<T, BridgeError>
where
    T: Serialize + DeserializeOwned,
{
    match result {
        Ok(value) => roundtrip(&value),
        Err(err) => Err(BridgeError::Remote(roundtrip(&err)?)),
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn identifier(&self) -> String {
        "local".to_string()
    }

    async fn implements(&self, capability: &Capability) -> Result<bool, BridgeError> {
        let request = roundtrip(&CapabilityRequest {
            capability: capability.clone(),
        })?;
        let response = roundtrip(&self.server.handle_implements(&request))?;
        Ok(response.implements)
    }

    async fn spec(&self, capability: &Capability) -> Result<FuncSpec, BridgeError> {
        let request = roundtrip(&CapabilityRequest {
            capability: capability.clone(),
        })?;
        let spec: FuncSpec = remote(self.server.handle_spec(&request))?;
        spec.validate()?;
        Ok(spec)
    }

    async fn call(
        &self,
        capability: &Capability,
        args: Args,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        let request = roundtrip(&CallRequest::new(capability.clone(), args))?;
        remote(self.server.handle_call(request, cancel).await).map(|_: CallResponse| ())
    }
}

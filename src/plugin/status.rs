//! The `Status` capability: "is this component healthy?"
//!
//! The provider's status function may ask for any injectable value and
//! reports only an error outcome.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::client::CapabilityClient;
use super::server::PluginServer;
use super::transport::Transport;
use crate::argmapper::{Func, ValueSet};
use crate::component::Capability;
use crate::error::BridgeError;
use crate::funcspec::{Args, FuncSpec};

/// Client stub for [`Capability::Status`].
#[derive(Debug)]
pub struct StatusClient {
    inner: CapabilityClient,
}

impl StatusClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::from_client(CapabilityClient::new(Capability::Status, transport))
    }

    /// Wrap a generic client that was already configured.
    pub fn from_client(inner: CapabilityClient) -> Self {
        debug_assert_eq!(inner.capability(), &Capability::Status);
        Self { inner }
    }

    pub fn client(&self) -> &CapabilityClient {
        &self.inner
    }

    pub async fn implements(&self) -> Result<bool, BridgeError> {
        self.inner.implements().await
    }

    /// The local wrapper of the provider's status function.
    pub async fn status_func(&self) -> Result<Option<Func>, BridgeError> {
        self.inner.func().await
    }

    /// Check status, resolving the function's inputs from `values`.
    pub async fn status(
        &self,
        values: ValueSet,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        self.inner.call(values, cancel).await
    }
}

impl PluginServer {
    pub fn is_status(&self) -> bool {
        self.is_implemented(&Capability::Status)
    }

    pub fn status_spec(&self) -> Result<FuncSpec, BridgeError> {
        self.spec(&Capability::Status)
    }

    pub async fn status(&self, args: Args, cancel: CancellationToken) -> Result<(), BridgeError> {
        self.call(&Capability::Status, args, cancel).await.map(|_| ())
    }
}

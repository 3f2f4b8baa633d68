//! The `StatusReport` capability: a detailed [`Report`](crate::component::Report)
//! about the resources a component manages.
//!
//! The provider's function returns the report. It stays on the provider:
//! callers learn only whether producing it succeeded.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::client::CapabilityClient;
use super::server::PluginServer;
use super::transport::Transport;
use crate::argmapper::{Func, ValueSet};
use crate::component::{Capability, Report};
use crate::error::BridgeError;
use crate::funcspec::{Args, FuncSpec};

/// Client stub for [`Capability::StatusReport`].
#[derive(Debug)]
pub struct StatusReportClient {
    inner: CapabilityClient,
}

impl StatusReportClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::from_client(CapabilityClient::new(Capability::StatusReport, transport))
    }

    /// Wrap a generic client that was already configured.
    pub fn from_client(inner: CapabilityClient) -> Self {
        debug_assert_eq!(inner.capability(), &Capability::StatusReport);
        Self { inner }
    }

    pub fn client(&self) -> &CapabilityClient {
        &self.inner
    }

    pub async fn implements(&self) -> Result<bool, BridgeError> {
        self.inner.implements().await
    }

    /// The local wrapper of the provider's report function.
    pub async fn status_report_func(&self) -> Result<Option<Func>, BridgeError> {
        self.inner.func().await
    }

    /// Ask the provider to produce a report.
    // TODO: carry the report back once the call response grows a result payload.
    pub async fn status_report(
        &self,
        values: ValueSet,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        self.inner.call(values, cancel).await
    }
}

impl PluginServer {
    pub fn is_status_report(&self) -> bool {
        self.is_implemented(&Capability::StatusReport)
    }

    pub fn status_report_spec(&self) -> Result<FuncSpec, BridgeError> {
        self.spec(&Capability::StatusReport)
    }

    /// Produce a report in process. Returns the report when the function
    /// yielded one.
    pub async fn status_report(
        &self,
        args: Args,
        cancel: CancellationToken,
    ) -> Result<Option<Report>, BridgeError> {
        let results = self.call(&Capability::StatusReport, args, cancel).await?;
        Ok(results
            .iter()
            .find_map(|value| value.downcast_ref::<Report>().cloned()))
    }
}

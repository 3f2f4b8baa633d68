//! Caller side of the capability bridge.
//!
//! A [`CapabilityClient`] talks to one capability of one provider. It probes
//! once, fetches the function specification once, and from then on builds a
//! local wrapper function whose inputs the caller's own resolver fills.
//!
//! ```text
//! Unprobed ──probe──► KnownAbsent            (no further RPCs)
//!     │
//!     └──────probe──► KnownPresent ──spec──► Ready (spec cached)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::transport::Transport;
use crate::argmapper::{self, Func, Value, ValueSet};
use crate::broker::{Broker, MemoryBroker};
use crate::component::Capability;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, ErrorKind};
use crate::funcspec::{self, Args, FuncSpec};
use crate::logger::Logger;
use crate::pluginargs::Internal;

/// What the client currently knows about its capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Unprobed,
    KnownAbsent,
    KnownPresent,
    Ready,
}

#[derive(Debug, Clone)]
enum Cached {
    Unprobed,
    Absent,
    Present,
    Ready(Arc<FuncSpec>),
}

/// Client stub for one capability on one connection.
pub struct CapabilityClient {
    capability: Capability,
    transport: Arc<dyn Transport>,
    logger: Logger,
    broker: Arc<dyn Broker>,
    mappers: Arc<[Func]>,
    cache_specs: bool,
    call_timeout: Option<Duration>,
    cached: Mutex<Cached>,
}

impl fmt::Debug for CapabilityClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityClient")
            .field("capability", &self.capability)
            .field("transport", &self.transport.identifier())
            .field("state", &self.state())
            .field("cache_specs", &self.cache_specs)
            .finish()
    }
}

impl CapabilityClient {
    pub fn new(capability: Capability, transport: Arc<dyn Transport>) -> Self {
        Self {
            capability,
            transport,
            logger: Logger::default(),
            broker: Arc::new(MemoryBroker::new()),
            mappers: Arc::from(Vec::new()),
            cache_specs: true,
            call_timeout: None,
            cached: Mutex::new(Cached::Unprobed),
        }
    }

    /// Builder: apply the client-side settings of `config`.
    pub fn with_config(mut self, config: &BridgeConfig) -> Self {
        self.logger = Logger::new(config.log_target.clone());
        self.cache_specs = config.cache_specs;
        self.call_timeout = config.call_timeout();
        self
    }

    /// Builder: set the logger injected into the wrapper's value set.
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Builder: set the broker handed to caller-side converters.
    pub fn with_broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = broker;
        self
    }

    /// Builder: set the caller-side converters.
    pub fn with_mappers(mut self, mappers: Vec<Func>) -> Self {
        self.mappers = Arc::from(mappers);
        self
    }

    /// Builder: cache probe and spec results for the life of the client.
    pub fn with_cache_specs(mut self, cache_specs: bool) -> Self {
        self.cache_specs = cache_specs;
        self
    }

    /// Builder: abandon remote calls that take longer than `timeout`.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    pub fn state(&self) -> ClientState {
        match &*self.cached.lock() {
            Cached::Unprobed => ClientState::Unprobed,
            Cached::Absent => ClientState::KnownAbsent,
            Cached::Present => ClientState::KnownPresent,
            Cached::Ready(_) => ClientState::Ready,
        }
    }

    fn remember(&self, cached: Cached) {
        if self.cache_specs {
            *self.cached.lock() = cached;
        }
    }

    /// Ask the provider whether the capability is implemented.
    ///
    /// A cached answer is returned without any RPC.
    ///
    /// # Errors
    /// Transport failures are returned as errors, never as `false`.
    pub async fn implements(&self) -> Result<bool, BridgeError> {
        let cached = self.cached.lock().clone();
        match cached {
            Cached::Absent => return Ok(false),
            Cached::Present | Cached::Ready(_) => return Ok(true),
            Cached::Unprobed => {}
        }

        let implements = self.transport.implements(&self.capability).await?;
        log::debug!(
            "{} probe of {} -> {}",
            self.transport.identifier(),
            self.capability,
            implements
        );
        self.remember(if implements {
            Cached::Present
        } else {
            Cached::Absent
        });
        Ok(implements)
    }

    /// Fetch the function specification, or `None` when the capability is absent.
    pub async fn spec(&self) -> Result<Option<Arc<FuncSpec>>, BridgeError> {
        let cached = self.cached.lock().clone();
        if let Cached::Ready(spec) = cached {
            return Ok(Some(spec));
        }
        if !self.implements().await? {
            return Ok(None);
        }

        let spec = Arc::new(self.transport.spec(&self.capability).await?);
        log::debug!("fetched spec {}", spec);
        self.remember(Cached::Ready(spec.clone()));
        Ok(Some(spec))
    }

    /// Build the local wrapper function, or `None` when the capability is absent.
    ///
    /// The wrapper's inputs are the FuncSpec's caller arguments plus a
    /// cancellation token. Running it sends one call request.
    pub async fn func(&self) -> Result<Option<Func>, BridgeError> {
        let spec = match self.spec().await? {
            Some(spec) => spec,
            None => return Ok(None),
        };

        let transport = self.transport.clone();
        let capability = self.capability.clone();
        let timeout = self.call_timeout;
        let func = funcspec::func(spec, move |args, cancel| {
            let transport = transport.clone();
            let capability = capability.clone();
            async move { remote_call(transport, capability, args, cancel, timeout).await }
        })
        .map_err(|e| BridgeError::SpecInconsistency {
            capability: self.capability.clone(),
            reason: e.to_string(),
        })?;
        Ok(Some(func))
    }

    /// Resolve the wrapper against `values` and run it.
    ///
    /// The client adds its logger, an [`Internal`] bundle and `cancel` to the
    /// value set. The call's ledger is drained before this returns. Results
    /// beyond the error outcome are discarded.
    ///
    /// # Errors
    /// `Unimplemented` if the provider does not implement the capability.
    pub async fn call(
        &self,
        values: ValueSet,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        let func = self
            .func()
            .await?
            .ok_or_else(|| BridgeError::Unimplemented(self.capability.clone()))?;

        let internal = Internal::new(self.broker.clone(), self.mappers.clone());
        let cleanup = internal.cleanup.clone();
        let mut values = values;
        values.extend([
            Value::typed(self.logger.clone()),
            Value::typed(internal),
            Value::typed(cancel.clone()),
        ]);

        cleanup
            .scope(argmapper::call(&func, values, &self.mappers, &cleanup, &cancel))
            .await
            .map(|_| ())
    }
}

async fn remote_call(
    transport: Arc<dyn Transport>,
    capability: Capability,
    args: Args,
    cancel: CancellationToken,
    timeout: Option<Duration>,
) -> Result<(), BridgeError> {
    let timeout = match timeout {
        Some(timeout) => timeout,
        None => {
            let result = transport.call(&capability, args, cancel.clone()).await;
            return settle(result, &cancel);
        }
    };

    // The call is never dropped mid-flight: on timeout the token fires and
    // the provider gets to drain its ledger before we return.
    let child = cancel.child_token();
    let call = transport.call(&capability, args, child.clone());
    tokio::pin!(call);
    tokio::select! {
        result = &mut call => settle(result, &cancel),
        _ = tokio::time::sleep(timeout) => {
            child.cancel();
            log::warn!("call {} timed out after {:?}", capability, timeout);
            match call.await {
                Err(e) if e.cleanup_failure().is_some() => Err(e),
                _ => Err(BridgeError::transport(format!(
                    "call {} timed out after {:?}",
                    capability, timeout
                ))),
            }
        }
    }
}

/// Report the provider's answer to a call the caller cancelled as a plain
/// cancellation, unless a release action failed on the way out.
fn settle(result: Result<(), BridgeError>, cancel: &CancellationToken) -> Result<(), BridgeError> {
    match result {
        Err(e)
            if cancel.is_cancelled()
                && e.kind() == ErrorKind::Cancelled
                && e.cleanup_failure().is_none() =>
        {
            Err(BridgeError::Cancelled)
        }
        other => other,
    }
}

/// Probe through an optional client. No client means not implemented.
pub async fn implements(client: Option<&CapabilityClient>) -> Result<bool, BridgeError> {
    match client {
        Some(client) => client.implements().await,
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::CapabilityRegistry;
    use crate::plugin::{LocalTransport, PluginServer};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn client_for(registry: CapabilityRegistry) -> CapabilityClient {
        let server = Arc::new(PluginServer::new(registry));
        CapabilityClient::new(Capability::Status, Arc::new(LocalTransport::new(server)))
    }

    #[tokio::test]
    async fn test_missing_client_is_not_implemented() {
        assert!(!implements(None).await.unwrap());
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let registry = CapabilityRegistry::new().with(Capability::Status, || {
            Func::builder("status").build_unit(|_| async { Ok(()) }).ok()
        });
        let client = client_for(registry);
        assert_eq!(client.state(), ClientState::Unprobed);

        assert!(client.implements().await.unwrap());
        assert_eq!(client.state(), ClientState::KnownPresent);

        client.spec().await.unwrap().unwrap();
        assert_eq!(client.state(), ClientState::Ready);

        client
            .call(ValueSet::new(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(client.state(), ClientState::Ready);
    }

    #[tokio::test]
    async fn test_absent_capability() {
        let client = client_for(CapabilityRegistry::new());
        assert!(!client.implements().await.unwrap());
        assert_eq!(client.state(), ClientState::KnownAbsent);
        assert!(client.func().await.unwrap().is_none());

        let err = client
            .call(ValueSet::new(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Unimplemented(Capability::Status)));
    }

    #[tokio::test]
    async fn test_uncached_client_stays_unprobed() {
        let registry = CapabilityRegistry::new().with(Capability::Status, || {
            Func::builder("status").build_unit(|_| async { Ok(()) }).ok()
        });
        let client = client_for(registry).with_cache_specs(false);
        client.spec().await.unwrap().unwrap();
        assert_eq!(client.state(), ClientState::Unprobed);
    }

    #[tokio::test]
    async fn test_call_timeout_cancels_remote_side() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let registry = CapabilityRegistry::new().with(Capability::Status, move || {
            let counter = counter.clone();
            Func::builder("slow")
                .input::<Internal>("internal")
                .build_unit(move |args| {
                    let counter = counter.clone();
                    async move {
                        let internal: Internal = args.get("internal")?;
                        internal.cleanup.defer_fn(move || {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        });
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok(())
                    }
                })
                .ok()
        });
        let client = client_for(registry).with_call_timeout(Some(Duration::from_millis(20)));

        let err = client
            .call(ValueSet::new(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}

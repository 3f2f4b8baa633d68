//! Provider side of the capability bridge.
//!
//! A [`PluginServer`] answers the three calls every capability speaks by
//! introspecting the functions in its [`CapabilityRegistry`]. Each call gets
//! its own value set and its own [`Cleanup`] ledger, drained before the
//! answer goes out.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::transport::{CallRequest, CallResponse, CapabilityRequest, ImplementsResponse};
use crate::argmapper::{self, Func, Value, ValueSet};
use crate::broker::{Broker, MemoryBroker};
use crate::component::{Capability, CapabilityRegistry};
use crate::error::{BridgeError, RemoteError};
use crate::funcspec::{self, Args, FuncSpec};
use crate::logger::Logger;
use crate::pluginargs::Internal;

/// Serves the capabilities of one provider.
pub struct PluginServer {
    registry: CapabilityRegistry,
    mappers: Arc<[Func]>,
    logger: Logger,
    broker: Arc<dyn Broker>,
}

impl fmt::Debug for PluginServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginServer")
            .field("registry", &self.registry)
            .field("mappers", &self.mappers.len())
            .field("logger", &self.logger)
            .finish()
    }
}

impl PluginServer {
    /// Serve `registry` with no converters, the default logger and an
    /// in-memory broker.
    pub fn new(registry: CapabilityRegistry) -> Self {
        Self {
            registry,
            mappers: Arc::from(Vec::new()),
            logger: Logger::default(),
            broker: Arc::new(MemoryBroker::new()),
        }
    }

    /// Builder: set the provider's converters.
    pub fn with_mappers(mut self, mappers: Vec<Func>) -> Self {
        self.mappers = Arc::from(mappers);
        self
    }

    /// Builder: set the logger injected into capability functions.
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Builder: set the broker for secondary streams.
    pub fn with_broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = broker;
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    fn internal(&self) -> Internal {
        Internal::new(self.broker.clone(), self.mappers.clone())
    }

    /// Values the provider contributes to every call of `capability`.
    fn context(
        &self,
        capability: &Capability,
        internal: &Internal,
        cancel: &CancellationToken,
    ) -> ValueSet {
        ValueSet::new()
            .with(Value::typed(self.logger.named(capability.as_str())))
            .with(Value::typed(internal.clone()))
            .with(Value::typed(cancel.clone()))
    }

    /// Look up the function behind `capability`.
    ///
    /// # Errors
    /// `Unimplemented` when nothing is registered, `SpecInconsistency` when
    /// the registered accessor yields no function.
    fn func(&self, capability: &Capability) -> Result<Func, BridgeError> {
        if !self.registry.contains(capability) {
            return Err(BridgeError::Unimplemented(capability.clone()));
        }
        self.registry
            .func(capability)
            .ok_or_else(|| BridgeError::SpecInconsistency {
                capability: capability.clone(),
                reason: "the registered accessor returned no function".to_string(),
            })
    }

    // -----------------------------------------------------------------------
    // Probe / spec / call
    // -----------------------------------------------------------------------

    /// Whether `capability` is registered and its accessor yields a function.
    pub fn is_implemented(&self, capability: &Capability) -> bool {
        self.registry.func(capability).is_some()
    }

    /// Describe the function behind `capability`.
    ///
    /// Inputs the provider can satisfy from its own context values and
    /// converters are marked as context arguments.
    pub fn spec(&self, capability: &Capability) -> Result<FuncSpec, BridgeError> {
        let func = self.func(capability)?;
        let context = self.context(capability, &self.internal(), &CancellationToken::new());
        let spec = funcspec::spec(&func, &self.mappers, &context)?;
        log::debug!("spec for {}: {}", capability, spec);
        Ok(spec)
    }

    /// Run `capability` with the caller-supplied `args`.
    ///
    /// `args` may only carry the function's caller arguments; an entry that
    /// names a context argument is rejected before anything runs. The call's
    /// ledger is drained before this returns, on every path. The function's
    /// results are handed back to in-process callers; they do not cross the
    /// wire.
    pub async fn call(
        &self,
        capability: &Capability,
        args: Args,
        cancel: CancellationToken,
    ) -> Result<Vec<Value>, BridgeError> {
        let func = self.func(capability)?;
        let internal = self.internal();
        let cleanup = internal.cleanup.clone();

        let context = self.context(capability, &internal, &cancel);
        let spec = funcspec::spec(&func, &self.mappers, &context)?;
        args.check_caller_args(&spec)?;

        let mut values = args.into_values();
        values.extend(context);

        cleanup
            .scope(argmapper::call(&func, values, &self.mappers, &cleanup, &cancel))
            .await
    }

    // -----------------------------------------------------------------------
    // Wire handlers
    // -----------------------------------------------------------------------

    /// Answer a probe request.
    pub fn handle_implements(&self, request: &CapabilityRequest) -> ImplementsResponse {
        let implements = self.is_implemented(&request.capability);
        log::debug!("probe {} -> {}", request.capability, implements);
        ImplementsResponse { implements }
    }

    /// Answer a spec request.
    pub fn handle_spec(&self, request: &CapabilityRequest) -> Result<FuncSpec, RemoteError> {
        self.spec(&request.capability).map_err(|e| {
            log::warn!("spec for {} failed: {}", request.capability, e);
            RemoteError::from(&e)
        })
    }

    /// Answer a call request.
    pub async fn handle_call(
        &self,
        request: CallRequest,
        cancel: CancellationToken,
    ) -> Result<CallResponse, RemoteError> {
        let CallRequest {
            capability,
            call_id,
            args,
        } = request;
        log::debug!(
            "call {} [{}] with {} caller argument(s)",
            capability,
            call_id,
            args.len()
        );

        match self.call(&capability, args, cancel).await {
            Ok(results) => {
                log::debug!(
                    "call {} [{}] succeeded with {} result(s)",
                    capability,
                    call_id,
                    results.len()
                );
                Ok(CallResponse { call_id })
            }
            Err(e) => {
                log::warn!("call {} [{}] failed: {}", capability, call_id, e);
                Err(RemoteError::from(&e))
            }
        }
    }
}

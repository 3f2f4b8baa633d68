//! Context values every bridge call carries.
//!
//! [`Internal`] bundles the resource broker, the converter list and the
//! call's [`Cleanup`] ledger. It is placed in the typed value set of every
//! call on both sides of the boundary, so any function or converter can ask
//! for it like any other argument.

pub mod cleanup;

use std::fmt;
use std::sync::Arc;

use crate::argmapper::{Func, Typed};
use crate::broker::Broker;

pub use cleanup::{Cleanup, CleanupError, ReleaseAction, ReleaseFailure};

/// Per-call plumbing injected into functions that ask for it.
#[derive(Clone)]
pub struct Internal {
    /// Broker for opening secondary streams.
    pub broker: Arc<dyn Broker>,
    /// Converters configured on this side of the bridge.
    pub mappers: Arc<[Func]>,
    /// Ledger for resources opened during this call.
    pub cleanup: Cleanup,
}

impl Internal {
    pub fn new(broker: Arc<dyn Broker>, mappers: Arc<[Func]>) -> Self {
        Self {
            broker,
            mappers,
            cleanup: Cleanup::new(),
        }
    }
}

impl fmt::Debug for Internal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Internal")
            .field("mappers", &self.mappers.len())
            .field("cleanup", &self.cleanup)
            .finish()
    }
}

impl Typed for Internal {
    const TYPE: &'static str = "capbridge.Internal";
}

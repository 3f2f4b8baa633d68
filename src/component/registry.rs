//! Capability registry: which capabilities a provider implements.
//!
//! Presence is a lookup in this table rather than a runtime type test. Each
//! entry holds an accessor that produces the capability's function on demand.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{Capability, Status, StatusReport};
use crate::argmapper::Func;

/// Produces a capability's function, or `None` when it has none to offer.
pub type Accessor = Arc<dyn Fn() -> Option<Func> + Send + Sync>;

/// Capabilities of one provider, fixed when the provider is built.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    entries: HashMap<Capability, Accessor>,
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().map(Capability::as_str).collect();
        names.sort_unstable();
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &names)
            .finish()
    }
}

impl CapabilityRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `capability` with an accessor. Replaces an earlier entry.
    pub fn register<F>(&mut self, capability: Capability, accessor: F)
    where
        F: Fn() -> Option<Func> + Send + Sync + 'static,
    {
        if self.entries.insert(capability.clone(), Arc::new(accessor)).is_some() {
            log::debug!("capability {} re-registered", capability);
        }
    }

    /// Builder: register an accessor.
    pub fn with<F>(mut self, capability: Capability, accessor: F) -> Self
    where
        F: Fn() -> Option<Func> + Send + Sync + 'static,
    {
        self.register(capability, accessor);
        self
    }

    /// Builder: register a [`Status`] implementation.
    pub fn with_status(self, component: Arc<dyn Status>) -> Self {
        self.with(Capability::Status, move || component.status_func())
    }

    /// Builder: register a [`StatusReport`] implementation.
    pub fn with_status_report(self, component: Arc<dyn StatusReport>) -> Self {
        self.with(Capability::StatusReport, move || {
            component.status_report_func()
        })
    }

    /// Whether `capability` has an entry at all.
    pub fn contains(&self, capability: &Capability) -> bool {
        self.entries.contains_key(capability)
    }

    /// The function for `capability`, if registered and the accessor yields one.
    pub fn func(&self, capability: &Capability) -> Option<Func> {
        self.entries.get(capability).and_then(|accessor| accessor())
    }

    /// Registered capabilities, in no particular order.
    pub fn capabilities(&self) -> impl Iterator<Item = &Capability> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! # capbridge
//!
//! Optional plugin capabilities across a process boundary.
//!
//! A provider exposes capabilities (`Status`, `StatusReport`, or any named
//! one) whose functions take arbitrary, capability-specific arguments. The
//! caller probes for a capability, fetches its function specification, and
//! calls it by supplying values; the argument resolver fills every input
//! from typed values and converter functions on both sides. Resources that
//! converters open are released through a per-call cleanup ledger.
//!
//! ```text
//! argmapper     typed values, Func, resolver, invoker
//! pluginargs    Internal context bundle, Cleanup ledger
//! funcspec      FuncSpec, wire Args, caller-side wrapper
//! component     Capability, provider traits, registry, Report
//! plugin        client/server stubs, Transport (local, HTTP)
//! broker        secondary streams
//! ```

pub mod argmapper;
pub mod broker;
pub mod component;
pub mod config;
pub mod error;
pub mod funcspec;
pub mod logger;
pub mod plugin;
pub mod pluginargs;

pub use argmapper::{Func, Typed, Value, ValueSet};
pub use broker::{Broker, MemoryBroker};
pub use component::{Capability, CapabilityRegistry, Status, StatusReport};
pub use config::BridgeConfig;
pub use error::{BridgeError, ErrorKind, RemoteError};
pub use funcspec::FuncSpec;
pub use logger::Logger;
pub use plugin::{
    CapabilityClient, HttpTransport, LocalTransport, PluginServer, StatusClient,
    StatusReportClient, Transport,
};
pub use pluginargs::{Cleanup, Internal};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

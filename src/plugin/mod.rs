//! The capability bridge.
//!
//! Every capability follows one pattern on the wire: a probe, a spec fetch
//! and a call. [`CapabilityClient`] drives that pattern from the caller;
//! [`PluginServer`] answers it from a [`CapabilityRegistry`](crate::component::CapabilityRegistry).
//! `Status` and `StatusReport` are thin instantiations of it.
//!
//! ```text
//! caller                                    provider
//! ──────                                    ────────
//! CapabilityClient ── Transport ──────────► PluginServer
//!   implements()      /v1/implements          is_implemented()
//!   spec()            /v1/spec                spec()
//!   call(values)      /v1/call  (Args)        call(args) → resolve → invoke → drain
//! ```

pub mod client;
pub mod http;
pub mod server;
pub mod status;
pub mod status_report;
pub mod transport;

pub use client::{implements, CapabilityClient, ClientState};
pub use http::{router, ApiError, HttpTransport};
pub use server::PluginServer;
pub use status::StatusClient;
pub use status_report::StatusReportClient;
pub use transport::{
    CallRequest, CallResponse, CapabilityRequest, ImplementsResponse, LocalTransport, Transport,
};

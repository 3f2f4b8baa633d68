//! Provider-side capability contracts.
//!
//! A capability is an optional unit of provider behavior. Providers opt in
//! by implementing one of the accessor traits here ([`Status`],
//! [`StatusReport`]) and registering it in a [`CapabilityRegistry`]; any
//! other capability is registered by name with a plain accessor closure.

pub mod registry;
pub mod report;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::argmapper::Func;

pub use registry::{Accessor, CapabilityRegistry};
pub use report::{Health, Report, ResourceReport};

/// Identity of a capability. Serialized as its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Capability {
    Status,
    StatusReport,
    Custom(String),
}

impl Capability {
    pub fn as_str(&self) -> &str {
        match self {
            Capability::Status => "Status",
            Capability::StatusReport => "StatusReport",
            Capability::Custom(name) => name,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Capability {
    fn from(name: String) -> Self {
        match name.as_str() {
            "Status" => Capability::Status,
            "StatusReport" => Capability::StatusReport,
            _ => Capability::Custom(name),
        }
    }
}

impl From<&str> for Capability {
    fn from(name: &str) -> Self {
        Capability::from(name.to_string())
    }
}

impl From<Capability> for String {
    fn from(capability: Capability) -> Self {
        match capability {
            Capability::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

/// A component that can report whether it is healthy.
///
/// The function may ask for any injectable value and returns only an error
/// outcome. Returning `None` means the capability is not implemented.
pub trait Status: Send + Sync {
    fn status_func(&self) -> Option<Func>;
}

/// A component that can produce a [`Report`] about the resources it manages.
pub trait StatusReport: Send + Sync {
    fn status_report_func(&self) -> Option<Func>;
}

//! Error taxonomy for the capability bridge.
//!
//! Every failure a bridge call can produce is a [`BridgeError`]. Capability
//! absence is deliberately *not* in here: probing an absent capability is a
//! successful `Ok(false)`.
//!
//! When an error crosses the remote boundary it travels as a [`RemoteError`],
//! the serde form that keeps the [`ErrorKind`] so the caller can still tell a
//! resolution failure from a function failure.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::argmapper::ResolveError;
use crate::component::Capability;
use crate::funcspec::SpecError;
use crate::pluginargs::CleanupError;

/// Errors surfaced by probe, spec and call operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The remote call itself failed (connection, encoding, bad response).
    #[error("transport error: {0}")]
    Transport(String),

    /// Encoding or decoding a message or argument value failed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The capability was invoked although the provider does not implement it.
    #[error("capability {0} is not implemented by the provider")]
    Unimplemented(Capability),

    /// The provider claims the capability but could not produce a function.
    #[error("capability {capability} is registered but produced no function: {reason}")]
    SpecInconsistency {
        capability: Capability,
        reason: String,
    },

    /// The function specification could not be built.
    #[error(transparent)]
    Spec(#[from] SpecError),

    /// A required argument could not be satisfied.
    #[error(transparent)]
    Resolution(#[from] ResolveError),

    /// The target function returned a failure outcome.
    #[error("{0:#}")]
    Invocation(anyhow::Error),

    /// The call's cancellation token fired before the function finished.
    #[error("call cancelled")]
    Cancelled,

    /// One or more release actions failed while draining the ledger.
    #[error(transparent)]
    Cleanup(#[from] CleanupError),

    /// A call failed and the ledger drain afterwards failed too.
    #[error("{primary} (cleanup also failed: {cleanup})")]
    WithCleanup {
        primary: Box<BridgeError>,
        cleanup: CleanupError,
    },

    /// An error reported by the provider across the remote boundary.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl BridgeError {
    /// Classify this error for the wire.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Transport(_) | BridgeError::Codec(_) => ErrorKind::Transport,
            BridgeError::Unimplemented(_) => ErrorKind::Unimplemented,
            BridgeError::SpecInconsistency { .. } | BridgeError::Spec(_) => {
                ErrorKind::SpecInconsistency
            }
            BridgeError::Resolution(_) => ErrorKind::Resolution,
            BridgeError::Invocation(_) => ErrorKind::Invocation,
            BridgeError::Cancelled => ErrorKind::Cancelled,
            BridgeError::Cleanup(_) => ErrorKind::Cleanup,
            BridgeError::WithCleanup { primary, .. } => primary.kind(),
            BridgeError::Remote(remote) => remote.kind,
        }
    }

    /// The message of the primary failure, without any cleanup suffix.
    pub fn primary_message(&self) -> String {
        match self {
            BridgeError::WithCleanup { primary, .. } => primary.primary_message(),
            BridgeError::Remote(remote) => remote.message.clone(),
            other => other.to_string(),
        }
    }

    /// Cleanup failures attached to this error, if any.
    pub fn cleanup_failure(&self) -> Option<String> {
        match self {
            BridgeError::Cleanup(cleanup) => Some(cleanup.to_string()),
            BridgeError::WithCleanup { cleanup, .. } => Some(cleanup.to_string()),
            BridgeError::Remote(remote) => remote.cleanup.clone(),
            _ => None,
        }
    }

    /// Build a transport error from anything printable.
    pub fn transport(err: impl fmt::Display) -> Self {
        BridgeError::Transport(err.to_string())
    }
}

/// Wire classification of a [`BridgeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Unimplemented,
    SpecInconsistency,
    Resolution,
    Invocation,
    Cancelled,
    Cleanup,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Unimplemented => "unimplemented",
            ErrorKind::SpecInconsistency => "spec_inconsistency",
            ErrorKind::Resolution => "resolution",
            ErrorKind::Invocation => "invocation",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

/// The single structured error outcome that crosses the remote boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("provider {kind} error: {message}")]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
    /// Ledger drain failures that accompanied the primary error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<String>,
}

impl From<&BridgeError> for RemoteError {
    fn from(err: &BridgeError) -> Self {
        if let BridgeError::Remote(remote) = err {
            return remote.clone();
        }
        let cleanup = match err {
            BridgeError::WithCleanup { cleanup, .. } => Some(cleanup.to_string()),
            _ => None,
        };
        RemoteError {
            kind: err.kind(),
            message: err.primary_message(),
            cleanup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pluginargs::ReleaseFailure;

    #[test]
    fn test_invocation_message_is_verbatim() {
        let err = BridgeError::Invocation(anyhow::anyhow!("disk on fire"));
        assert_eq!(err.to_string(), "disk on fire");
        assert_eq!(err.kind(), ErrorKind::Invocation);
    }

    #[test]
    fn test_with_cleanup_keeps_both_errors_observable() {
        let err = BridgeError::WithCleanup {
            primary: Box::new(BridgeError::Invocation(anyhow::anyhow!("boom"))),
            cleanup: CleanupError {
                failures: vec![ReleaseFailure {
                    index: 0,
                    message: "stream already closed".into(),
                }],
            },
        };

        assert_eq!(err.kind(), ErrorKind::Invocation);
        assert_eq!(err.primary_message(), "boom");
        assert!(err.cleanup_failure().unwrap().contains("stream already closed"));

        let remote = RemoteError::from(&err);
        assert_eq!(remote.kind, ErrorKind::Invocation);
        assert_eq!(remote.message, "boom");
        assert!(remote.cleanup.unwrap().contains("stream already closed"));
    }

    #[test]
    fn test_remote_error_wire_shape() {
        let remote = RemoteError {
            kind: ErrorKind::Resolution,
            message: "missing".into(),
            cleanup: None,
        };
        let json = serde_json::to_value(&remote).unwrap();
        assert_eq!(json["kind"], "resolution");
        assert!(json.get("cleanup").is_none());

        let back: RemoteError = serde_json::from_value(json).unwrap();
        assert_eq!(back, remote);
    }
}

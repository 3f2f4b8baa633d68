//! Cleanup ledger: ordered release actions for one logical call.
//!
//! Converters that open resources (broker streams, temp files, remote
//! handles) register a release action with [`Cleanup::defer`]. The outermost
//! caller of the call path drains the ledger exactly once with
//! [`Cleanup::close`], usually through [`Cleanup::scope`] so that every exit
//! path is covered.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use thiserror::Error;

use crate::error::BridgeError;

/// A deferred release action.
pub type ReleaseAction = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// A single release action that failed while draining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFailure {
    /// Position of the action in the ledger (0-based, insertion order).
    pub index: usize,
    pub message: String,
}

/// Aggregate of every release action that failed during one drain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct CleanupError {
    pub failures: Vec<ReleaseFailure>,
}

impl fmt::Display for CleanupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} release action(s) failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; #{}: {}", failure.index, failure.message)?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Ledger {
    actions: Vec<ReleaseAction>,
    /// Number of actions ever deferred, so indices stay stable across drains.
    deferred: usize,
    /// Index of the first action still pending.
    pending_from: usize,
    closed: bool,
}

impl Drop for Ledger {
    fn drop(&mut self) {
        if self.actions.is_empty() {
            return;
        }

        let actions = std::mem::take(&mut self.actions);
        log::warn!(
            "cleanup ledger dropped with {} pending release action(s); draining now",
            actions.len()
        );

        let drain = async move {
            for (offset, action) in actions.into_iter().enumerate() {
                if let Err(e) = action().await {
                    log::warn!("release action #{} failed during drop: {:#}", offset, e);
                }
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(drain);
            }
            Err(_) => futures::executor::block_on(drain),
        }
    }
}

/// Ordered, append-only list of release actions shared by one call.
///
/// Clones share the same ledger, so the same `Cleanup` can sit inside an
/// [`Internal`](super::Internal) value handed to converters and be drained
/// by the call path that created it.
#[derive(Clone, Default)]
pub struct Cleanup {
    inner: Arc<Mutex<Ledger>>,
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ledger = self.inner.lock();
        f.debug_struct("Cleanup")
            .field("pending", &ledger.actions.len())
            .field("closed", &ledger.closed)
            .finish()
    }
}

impl Cleanup {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async release action.
    ///
    /// Actions deferred after [`close`](Self::close) already ran are not
    /// lost: they run when the last handle to the ledger is dropped.
    pub fn defer<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut ledger = self.inner.lock();
        if ledger.closed {
            log::warn!("release action deferred after the ledger was closed");
        }
        ledger.deferred += 1;
        ledger.actions.push(Box::new(move || action().boxed()));
    }

    /// Register a synchronous release action.
    pub fn defer_fn<F>(&self, action: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.defer(move || async move { action() });
    }

    /// Number of release actions waiting to run.
    pub fn len(&self) -> usize {
        self.inner.lock().actions.len()
    }

    /// Whether no release action is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`close`](Self::close) has drained this ledger.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Drain the ledger in insertion order.
    ///
    /// Every pending action is attempted even when earlier ones fail; all
    /// failures are returned together. Only the first call drains; later
    /// calls return `Ok(())` without running anything.
    pub async fn close(&self) -> Result<(), CleanupError> {
        let (actions, first_index) = {
            let mut ledger = self.inner.lock();
            if ledger.closed {
                return Ok(());
            }
            ledger.closed = true;
            let first = ledger.pending_from;
            ledger.pending_from = ledger.deferred;
            (std::mem::take(&mut ledger.actions), first)
        };

        let mut failures = Vec::new();
        for (offset, action) in actions.into_iter().enumerate() {
            let index = first_index + offset;
            if let Err(e) = action().await {
                log::warn!("release action #{} failed: {:#}", index, e);
                failures.push(ReleaseFailure {
                    index,
                    message: format!("{:#}", e),
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CleanupError { failures })
        }
    }

    /// Run `body` and then drain the ledger, on every exit path.
    ///
    /// A body error and a drain error are both kept: the result is
    /// [`BridgeError::WithCleanup`] when both fail.
    pub async fn scope<T, F>(&self, body: F) -> Result<T, BridgeError>
    where
        F: Future<Output = Result<T, BridgeError>>,
    {
        let result = body.await;
        let drained = self.close().await;

        match (result, drained) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(cleanup)) => Err(BridgeError::Cleanup(cleanup)),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(cleanup)) => Err(BridgeError::WithCleanup {
                primary: Box::new(err),
                cleanup,
            }),
        }
    }
}

//! Dynamic invocation of resolved functions.

use tokio_util::sync::CancellationToken;

use super::func::{Arguments, Func};
use super::resolver::{resolve, ResolveError};
use super::value::{Value, ValueSet};
use crate::error::BridgeError;
use crate::pluginargs::Cleanup;

/// Outcome of a single invocation that did not succeed.
#[derive(Debug)]
pub enum InvokeError {
    /// The function returned its failure outcome.
    Failed(anyhow::Error),
    /// The cancellation token fired first.
    Cancelled,
}

/// Call `func` once with already-resolved arguments.
///
/// The body races the cancellation token; whichever finishes first decides
/// the outcome. A body marked [`watches_cancel`](Func::watches_cancel) is
/// awaited to completion instead and reports cancellation itself. There is
/// no retry.
pub async fn invoke(
    func: &Func,
    args: Arguments,
    cancel: &CancellationToken,
) -> Result<Vec<Value>, InvokeError> {
    if cancel.is_cancelled() {
        return Err(InvokeError::Cancelled);
    }

    let body = func.run(args);
    if func.watches_cancel() {
        return body.await.map_err(InvokeError::Failed);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            log::debug!("invocation of `{}` cancelled", func.name());
            Err(InvokeError::Cancelled)
        }
        result = body => result.map_err(InvokeError::Failed),
    }
}

/// Resolve and invoke `func` against `values` and `converters`.
///
/// The ledger is filled but not drained; the outermost caller owns that
/// (see [`Cleanup::scope`]). A [`BridgeError`] raised inside the function
/// body, for example by a remote call, is passed through unchanged instead
/// of being reported as an invocation failure.
pub async fn call(
    func: &Func,
    mut values: ValueSet,
    converters: &[Func],
    cleanup: &Cleanup,
    cancel: &CancellationToken,
) -> Result<Vec<Value>, BridgeError> {
    let args = resolve(func, &mut values, converters, cleanup, cancel)
        .await
        .map_err(|e| match e {
            ResolveError::Cancelled => BridgeError::Cancelled,
            other => BridgeError::Resolution(other),
        })?;

    match invoke(func, args, cancel).await {
        Ok(results) => Ok(results),
        Err(InvokeError::Cancelled) => Err(BridgeError::Cancelled),
        Err(InvokeError::Failed(error)) => match error.downcast::<BridgeError>() {
            Ok(bridge) => Err(bridge),
            Err(error) => Err(BridgeError::Invocation(error)),
        },
    }
}

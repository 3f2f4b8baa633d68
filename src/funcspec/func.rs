//! Caller-side wrapper functions built from a remote [`FuncSpec`].

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::args::Args;
use super::spec::FuncSpec;
use crate::argmapper::{Func, FuncError};
use crate::error::BridgeError;

/// Parameter name the wrapper uses for its cancellation token.
pub const CANCEL_ARG: &str = "capbridge.cancel";

/// Build a local [`Func`] that stands in for a remote function.
///
/// The wrapper declares the FuncSpec's caller-supplied arguments as its own
/// inputs, so the local resolver can fill them from caller values and
/// converters. When invoked it encodes those arguments into [`Args`] and
/// hands them to `callback`, which performs the remote call.
///
/// The wrapper watches its own cancellation token: `callback` receives it and
/// is expected to return once the far side has answered the cancelled call.
pub fn func<F, Fut>(spec: Arc<FuncSpec>, callback: F) -> Result<Func, FuncError>
where
    F: Fn(Args, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BridgeError>> + Send + 'static,
{
    let mut builder = Func::builder(spec.name.clone());
    for arg in spec.caller_args() {
        builder = builder.param(arg.param());
    }
    builder = builder.input::<CancellationToken>(CANCEL_ARG).watches_cancel();

    let callback = Arc::new(callback);
    builder.build_unit(move |arguments| {
        let spec = spec.clone();
        let callback = callback.clone();
        async move {
            let payload = Args::from_arguments(&spec, &arguments).map_err(BridgeError::from)?;
            let cancel = arguments.get::<CancellationToken>(CANCEL_ARG)?;
            callback(payload, cancel).await?;
            Ok(())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argmapper::{call, Value, ValueSet};
    use crate::funcspec::{ArgSource, SpecArg};
    use crate::pluginargs::Cleanup;
    use parking_lot::Mutex;

    fn greeting_spec() -> Arc<FuncSpec> {
        Arc::new(
            FuncSpec::new(
                "greet",
                vec![
                    SpecArg {
                        name: "ctx".into(),
                        type_name: "context.Cancellation".into(),
                        source: ArgSource::Context,
                    },
                    SpecArg {
                        name: "who".into(),
                        type_name: "test.Name".into(),
                        source: ArgSource::Caller,
                    },
                ],
                Vec::new(),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_wrapper_sends_only_caller_args() {
        let sent = Arc::new(Mutex::new(None));
        let sink = sent.clone();
        let wrapper = func(greeting_spec(), move |args, _cancel| {
            let sink = sink.clone();
            async move {
                *sink.lock() = Some(args);
                Ok(())
            }
        })
        .unwrap();

        let names: Vec<_> = wrapper.inputs().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["who", CANCEL_ARG]);
        assert!(wrapper.watches_cancel());

        let values = ValueSet::new()
            .with(Value::wire("test.Name", serde_json::json!("ada")))
            .with(Value::typed(CancellationToken::new()));
        call(
            &wrapper,
            values,
            &[],
            &Cleanup::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let args = sent.lock().take().unwrap();
        assert_eq!(args.len(), 1);
        assert_eq!(args.args[0].value, serde_json::json!("ada"));
    }

    #[tokio::test]
    async fn test_wrapper_passes_remote_errors_through() {
        let wrapper = func(greeting_spec(), |_args, _cancel| async {
            Err(BridgeError::transport("connection refused"))
        })
        .unwrap();
        let values = ValueSet::new()
            .with(Value::wire("test.Name", serde_json::json!("ada")))
            .with(Value::typed(CancellationToken::new()));

        let err = call(
            &wrapper,
            values,
            &[],
            &Cleanup::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)));
    }
}

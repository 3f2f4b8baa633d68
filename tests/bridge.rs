//! End-to-end caller ↔ provider scenarios over the in-process transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use capbridge::argmapper::Arguments;
use capbridge::component::{Health, Report};
use capbridge::funcspec::{Args, FuncSpec};
use capbridge::pluginargs::Internal;
use capbridge::{
    BridgeError, Broker, Capability, CapabilityClient, CapabilityRegistry, ErrorKind, Func,
    LocalTransport, MemoryBroker, PluginServer, StatusClient, StatusReportClient, Transport, Typed,
    Value, ValueSet,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Counts RPCs and remembers the last call payload.
struct CountingTransport {
    inner: LocalTransport,
    implements: AtomicUsize,
    spec: AtomicUsize,
    call: AtomicUsize,
    last_args: Mutex<Option<Args>>,
}

impl CountingTransport {
    fn new(server: PluginServer) -> Arc<Self> {
        Arc::new(Self {
            inner: LocalTransport::new(Arc::new(server)),
            implements: AtomicUsize::new(0),
            spec: AtomicUsize::new(0),
            call: AtomicUsize::new(0),
            last_args: Mutex::new(None),
        })
    }

    fn counts(&self) -> (usize, usize, usize) {
        (
            self.implements.load(Ordering::SeqCst),
            self.spec.load(Ordering::SeqCst),
            self.call.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl Transport for CountingTransport {
    fn identifier(&self) -> String {
        "counting".to_string()
    }

    async fn implements(&self, capability: &Capability) -> Result<bool, BridgeError> {
        self.implements.fetch_add(1, Ordering::SeqCst);
        self.inner.implements(capability).await
    }

    async fn spec(&self, capability: &Capability) -> Result<FuncSpec, BridgeError> {
        self.spec.fetch_add(1, Ordering::SeqCst);
        self.inner.spec(capability).await
    }

    async fn call(
        &self,
        capability: &Capability,
        args: Args,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        self.call.fetch_add(1, Ordering::SeqCst);
        *self.last_args.lock() = Some(args.clone());
        self.inner.call(capability, args, cancel).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Environment(String);

impl Typed for Environment {
    const TYPE: &'static str = "app.Environment";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Region(String);

impl Typed for Region {
    const TYPE: &'static str = "app.Region";
}

fn status_only(func: impl Fn() -> Option<Func> + Send + Sync + 'static) -> CapabilityRegistry {
    CapabilityRegistry::new().with(Capability::Status, func)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn absent_status_issues_no_further_rpcs() {
    let transport = CountingTransport::new(PluginServer::new(CapabilityRegistry::new()));
    let client = StatusClient::new(transport.clone());

    assert!(!client.implements().await.unwrap());
    assert!(client.status_func().await.unwrap().is_none());
    let err = client
        .status(ValueSet::new(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Unimplemented(Capability::Status)));

    assert_eq!(transport.counts(), (1, 0, 0));
}

#[tokio::test]
async fn context_only_status_sends_empty_payload() {
    let transport = CountingTransport::new(PluginServer::new(status_only(|| {
        Func::builder("status")
            .input::<CancellationToken>("ctx")
            .build_unit(|_| async { Ok(()) })
            .ok()
    })));
    let client = StatusClient::new(transport.clone());

    client
        .status(ValueSet::new(), CancellationToken::new())
        .await
        .unwrap();

    assert!(transport.last_args.lock().as_ref().unwrap().is_empty());
    assert_eq!(transport.counts(), (1, 1, 1));
}

#[tokio::test]
async fn failure_is_verbatim_and_provider_ledger_drains() {
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();
    let server = PluginServer::new(status_only(move || {
        let counter = counter.clone();
        Func::builder("status")
            .input::<Internal>("internal")
            .build_unit(move |args: Arguments| {
                let counter = counter.clone();
                async move {
                    let internal: Internal = args.get("internal")?;
                    internal.cleanup.defer_fn(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    });
                    Err(anyhow::anyhow!("replica set has no primary"))
                }
            })
            .ok()
    }));
    let client = StatusClient::new(Arc::new(LocalTransport::new(Arc::new(server))));

    let err = client
        .status(ValueSet::new(), CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invocation);
    assert_eq!(err.primary_message(), "replica set has no primary");
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancelled_call_returns_after_provider_ledger_drains() {
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();
    let server = PluginServer::new(status_only(move || {
        let counter = counter.clone();
        Func::builder("status")
            .input::<Internal>("internal")
            .build_unit(move |args: Arguments| {
                let counter = counter.clone();
                async move {
                    let internal: Internal = args.get("internal")?;
                    internal.cleanup.defer(move || async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    });
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                }
            })
            .ok()
    }));
    let client = StatusClient::new(Arc::new(LocalTransport::new(Arc::new(server))));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let err = client.status(ValueSet::new(), cancel).await.unwrap_err();
    assert!(matches!(err, BridgeError::Cancelled));
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_converter_releases_earlier_streams() {
    let broker = Arc::new(MemoryBroker::new());
    let released = Arc::new(Mutex::new(Vec::new()));

    let log = released.clone();
    let open_log_stream = Func::builder("open_log_stream")
        .input::<Internal>("internal")
        .output_type("stream", "app.LogStream")
        .converter(move |args| {
            let log = log.clone();
            async move {
                let internal: Internal = args.get("internal")?;
                let id = internal.broker.next_id();
                let stream = internal.broker.open_stream(id).await?;
                let broker = internal.broker.clone();
                internal.cleanup.defer(move || async move {
                    drop(stream);
                    broker.close_stream(id);
                    log.lock().push(id);
                    Ok(())
                });
                Ok(vec![Value::with_type("app.LogStream", id)])
            }
        })
        .unwrap();
    let attach = Func::builder("attach")
        .input_type("stream", "app.LogStream")
        .output_type("attached", "app.Attached")
        .converter(|_| async { Err(anyhow::anyhow!("log collector refused the stream")) })
        .unwrap();

    let server = PluginServer::new(status_only(|| {
        Func::builder("status")
            .input_type("attached", "app.Attached")
            .build_unit(|_| async {
                if true {
                    panic!("status must not run");
                }
                Ok(())
            })
            .ok()
    }))
    .with_mappers(vec![open_log_stream, attach])
    .with_broker(broker.clone());
    let client = StatusClient::new(Arc::new(LocalTransport::new(Arc::new(server))));

    let spec = client.client().spec().await.unwrap().unwrap();
    assert_eq!(spec.caller_args().count(), 0);

    let err = client
        .status(ValueSet::new(), CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resolution);
    assert!(err.primary_message().contains("log collector refused the stream"));
    assert_eq!(released.lock().len(), 1);
    assert_eq!(broker.pending(), 0);
}

#[tokio::test]
async fn caller_converters_fill_caller_arguments() {
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let server = PluginServer::new(status_only(move || {
        let sink = sink.clone();
        Func::builder("status")
            .input::<CancellationToken>("ctx")
            .input::<Region>("region")
            .build_unit(move |args| {
                let sink = sink.clone();
                async move {
                    *sink.lock() = Some(args.decode::<Region>("region")?);
                    Ok(())
                }
            })
            .ok()
    }));

    let region_for_env = Func::builder("region_for_env")
        .input::<Environment>("env")
        .output::<Region>("region")
        .converter(|args| async move {
            let env: Environment = args.get("env")?;
            let region = if env.0 == "prod" { "eu-west-1" } else { "local" };
            Ok(vec![Value::serializable(Region(region.to_string()))])
        })
        .unwrap();

    let transport = CountingTransport::new(server);
    let client = CapabilityClient::new(Capability::Status, transport.clone())
        .with_mappers(vec![region_for_env]);

    let spec = client.spec().await.unwrap().unwrap();
    let caller: Vec<_> = spec.caller_args().map(|a| a.name.as_str()).collect();
    assert_eq!(caller, vec!["region"]);

    client
        .call(
            ValueSet::new().with(Value::typed(Environment("prod".into()))),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(*seen.lock(), Some(Region("eu-west-1".into())));
    let sent = transport.last_args.lock().clone().unwrap();
    assert_eq!(sent.args[0].type_name, Region::TYPE);
}

#[tokio::test]
async fn missing_caller_value_fails_before_any_call() {
    let transport = CountingTransport::new(PluginServer::new(status_only(|| {
        Func::builder("status")
            .input::<Region>("region")
            .build_unit(|_| async { Ok(()) })
            .ok()
    })));
    let client = StatusClient::new(transport.clone());

    let err = client
        .status(ValueSet::new(), CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        BridgeError::Resolution(resolve) => assert_eq!(resolve.missing_type(), Some(Region::TYPE)),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(transport.counts().2, 0);
}

#[tokio::test]
async fn status_report_succeeds_and_discards_report() {
    let registry = CapabilityRegistry::new().with(Capability::StatusReport, || {
        Func::builder("report")
            .output::<Report>("report")
            .build(|_| async { Ok(vec![Value::serializable(Report::new(Health::Alive, "up"))]) })
            .ok()
    });
    let transport = CountingTransport::new(PluginServer::new(registry));
    let client = StatusReportClient::new(transport.clone());

    assert!(client.implements().await.unwrap());
    client
        .status_report(ValueSet::new(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(transport.counts(), (1, 1, 1));
}

#[tokio::test]
async fn spec_is_fetched_once_unless_caching_is_off() {
    let registry = || {
        status_only(|| {
            Func::builder("status")
                .build_unit(|_| async { Ok(()) })
                .ok()
        })
    };

    let cached = CountingTransport::new(PluginServer::new(registry()));
    let client = CapabilityClient::new(Capability::Status, cached.clone());
    for _ in 0..3 {
        client
            .call(ValueSet::new(), CancellationToken::new())
            .await
            .unwrap();
    }
    assert_eq!(cached.counts(), (1, 1, 3));

    let uncached = CountingTransport::new(PluginServer::new(registry()));
    let client =
        CapabilityClient::new(Capability::Status, uncached.clone()).with_cache_specs(false);
    for _ in 0..3 {
        client
            .call(ValueSet::new(), CancellationToken::new())
            .await
            .unwrap();
    }
    assert_eq!(uncached.counts(), (3, 3, 3));
}

#[tokio::test]
async fn transport_errors_are_not_absence() {
    struct Broken;

    #[async_trait]
    impl Transport for Broken {
        fn identifier(&self) -> String {
            "broken".to_string()
        }

        async fn implements(&self, _: &Capability) -> Result<bool, BridgeError> {
            Err(BridgeError::transport("connection refused"))
        }

        async fn spec(&self, _: &Capability) -> Result<FuncSpec, BridgeError> {
            unreachable!()
        }

        async fn call(
            &self,
            _: &Capability,
            _: Args,
            _: CancellationToken,
        ) -> Result<(), BridgeError> {
            unreachable!()
        }
    }

    let client = StatusClient::new(Arc::new(Broken));
    let err = client.implements().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(capbridge::plugin::implements(None).await.is_ok());
}

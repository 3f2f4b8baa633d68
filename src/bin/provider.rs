//! Sample capability provider served over HTTP.
//!
//! Implements `Status` (checks a data directory exists) and `StatusReport`
//! (reports on the data directory and the temp directory).
//!
//! # Environment Variables
//!
//! - `CAPBRIDGE_CONFIG`: path to a YAML config file (optional)
//! - `CAPBRIDGE_DATA_DIR`: directory the status check looks at (default: `.`)
//! - `CAPBRIDGE_*`: config overrides, see `capbridge::config`
//! - `RUST_LOG`: tracing filter (default: "info,capbridge=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin capbridge-provider
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use capbridge::component::{Health, Report, ResourceReport};
use capbridge::plugin::router;
use capbridge::{
    BridgeConfig, CapabilityRegistry, Func, Logger, PluginServer, Status, StatusReport, Value,
};
use tokio_util::sync::CancellationToken;

struct DataDir {
    path: PathBuf,
}

impl DataDir {
    fn resource(name: &str, path: &std::path::Path) -> ResourceReport {
        let (health, message) = match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => (Health::Ready, String::new()),
            Ok(_) => (Health::Down, format!("{} is not a directory", path.display())),
            Err(e) => (Health::Down, format!("{}: {}", path.display(), e)),
        };
        ResourceReport {
            name: name.to_string(),
            health,
            message,
        }
    }
}

impl Status for DataDir {
    fn status_func(&self) -> Option<Func> {
        let path = self.path.clone();
        Func::builder("data_dir_status")
            .input::<CancellationToken>("ctx")
            .input::<Logger>("logger")
            .build_unit(move |args| {
                let path = path.clone();
                async move {
                    let logger: Logger = args.get("logger")?;
                    logger.debug(&format!("checking {}", path.display()));
                    if !path.is_dir() {
                        anyhow::bail!("data directory {} is missing", path.display());
                    }
                    Ok(())
                }
            })
            .ok()
    }
}

impl StatusReport for DataDir {
    fn status_report_func(&self) -> Option<Func> {
        let path = self.path.clone();
        Func::builder("data_dir_report")
            .input::<CancellationToken>("ctx")
            .output::<Report>("report")
            .build(move |_| {
                let path = path.clone();
                async move {
                    let report = Report::from_resources(vec![
                        DataDir::resource("data", &path),
                        DataDir::resource("tmp", &std::env::temp_dir()),
                    ]);
                    tracing::info!("status report: {:?} ({})", report.health, report.message);
                    Ok(vec![Value::serializable(report)])
                }
            })
            .ok()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,capbridge=debug".into()),
        )
        .init();

    let config = match std::env::var("CAPBRIDGE_CONFIG") {
        Ok(path) => BridgeConfig::from_file(path)?,
        Err(_) => BridgeConfig::default(),
    }
    .apply_env()?;

    let data_dir = Arc::new(DataDir {
        path: std::env::var("CAPBRIDGE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".")),
    });
    let registry = CapabilityRegistry::new()
        .with_status(data_dir.clone())
        .with_status_report(data_dir);
    let server = Arc::new(
        PluginServer::new(registry).with_logger(Logger::new(config.log_target.clone())),
    );

    let app = router(server);

    tracing::info!("capbridge provider starting on {}", config.http.bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health        : liveness probe");
    tracing::info!("  POST /v1/implements : capability probe");
    tracing::info!("  POST /v1/spec       : function specification");
    tracing::info!("  POST /v1/call       : capability call");

    let listener = tokio::net::TcpListener::bind(&config.http.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

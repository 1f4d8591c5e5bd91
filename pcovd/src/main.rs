//! Pipeline coverage daemon.
//!
//! Reconciles the mounted manifests on a schedule and on every change, and
//! serves the result as Prometheus metrics and as a JSON record.

#![forbid(unsafe_code)]

mod http_api;
mod metrics;
mod trigger;

use anyhow::{Context, Result};
use clap::Parser;
use pcov::{CoverageEngine, ManifestConfig};
use pcov_common::{CoverageSettings, LogConfig, init_logging};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use metrics::PrometheusSink;
use trigger::{CoverageState, TriggerConfig, TriggerLoop};

#[derive(Parser)]
#[command(name = "pcovd")]
#[command(author, version, about = "Pipeline coverage daemon")]
struct Cli {
    /// Manifest directory (defaults to PCOV_MANIFEST_DIR)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Address for the metrics endpoint (defaults to PCOV_METRICS_ADDR)
    #[arg(long)]
    listen: Option<String>,

    /// Reconcile interval, e.g. "30s" or "5m"
    #[arg(long)]
    interval: Option<humantime::Duration>,

    /// Do not reconcile on manifest directory changes
    #[arg(long)]
    no_watch: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(self, mut settings: CoverageSettings) -> CoverageSettings {
        settings.manifest_dir = settings.manifest_dir.override_with(self.dir);
        settings.metrics_addr = settings.metrics_addr.override_with(self.listen);
        settings.reconcile_interval_secs = settings
            .reconcile_interval_secs
            .override_with(self.interval.map(|d| d.as_secs().max(1)));
        settings.watch = settings
            .watch
            .override_with(self.no_watch.then_some(false));
        settings
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (settings, env_errors) = CoverageSettings::from_env();

    let mut log_config = LogConfig::from_settings(&settings);
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = init_logging(&log_config)?;

    for error in &env_errors {
        warn!(%error, "Ignoring invalid environment value");
    }

    let settings = cli.apply(settings);
    info!(
        dir = %settings.manifest_dir.value.display(),
        dir_source = %settings.manifest_dir.source,
        interval_secs = settings.reconcile_interval_secs.value,
        watch = settings.watch.value,
        "Starting pipeline coverage daemon..."
    );

    let registry = metrics::default_registry();
    let sink = Arc::new(PrometheusSink::register(registry)?);
    let config = ManifestConfig::from_settings(&settings);
    let watch_dir = settings.watch.value.then(|| config.directory.clone());
    let engine = Arc::new(CoverageEngine::new(config, sink));

    let coverage = Arc::new(CoverageState::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let trigger_handle = TriggerLoop::new(
        engine,
        settings.identity.clone(),
        coverage.clone(),
        TriggerConfig {
            interval: settings.reconcile_interval(),
            watch_dir,
        },
    )
    .start(shutdown_rx);

    let addr: SocketAddr = settings
        .metrics_addr
        .value
        .parse()
        .with_context(|| format!("invalid metrics address {:?}", settings.metrics_addr.value))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Serving metrics on http://{}/metrics/e2e", addr);

    let router = http_api::router(http_api::ApiState {
        coverage,
        registry: registry.clone(),
        version: env!("CARGO_PKG_VERSION"),
        started_at: Instant::now(),
    });
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    trigger_handle.await?;
    info!("Daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}

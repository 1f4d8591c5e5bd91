//! Reconciliation triggers and the latest coverage record.
//!
//! The loop reconciles once at startup, then on every interval tick and on
//! every change in the manifest directory. Each run goes through the blocking
//! pool. Nothing is retried; a failed run is simply recomputed by the next
//! trigger.

use chrono::{DateTime, Utc};
use notify::{Event, RecursiveMode, Watcher};
use pcov::Reconcile;
use pcov_common::{Phase, PipelineCoverage, RecordIdentity};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

/// What caused a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Startup,
    Interval,
    Watch,
}

/// A stored reconciliation result.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageSnapshot {
    pub record: PipelineCoverage,
    pub reconciled_at: DateTime<Utc>,
    pub trigger: TriggerSource,
}

/// Latest record shared between the trigger loop and the HTTP handlers.
#[derive(Debug, Default)]
pub struct CoverageState {
    latest: RwLock<Option<CoverageSnapshot>>,
    runs: AtomicU64,
}

impl CoverageState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, snapshot: CoverageSnapshot) {
        let mut latest = self
            .latest
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *latest = Some(snapshot);
        self.runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn latest(&self) -> Option<CoverageSnapshot> {
        self.latest
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn latest_phase(&self) -> Option<Phase> {
        self.latest
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|snapshot| snapshot.record.result.phase)
    }

    /// Number of completed reconciliations.
    pub fn run_count(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub interval: Duration,
    /// Directory to watch; `None` disables the watcher.
    pub watch_dir: Option<PathBuf>,
}

pub struct TriggerLoop {
    engine: Arc<dyn Reconcile>,
    identity: RecordIdentity,
    state: Arc<CoverageState>,
    config: TriggerConfig,
}

impl TriggerLoop {
    pub fn new(
        engine: Arc<dyn Reconcile>,
        identity: RecordIdentity,
        state: Arc<CoverageState>,
        config: TriggerConfig,
    ) -> Self {
        Self {
            engine,
            identity,
            state,
            config,
        }
    }

    /// Run one reconciliation on the blocking pool and store its record.
    pub async fn run_once(&self, trigger: TriggerSource) {
        let engine = Arc::clone(&self.engine);
        let reconciliation = match tokio::task::spawn_blocking(move || engine.reconcile()).await
        {
            Ok(reconciliation) => reconciliation,
            Err(e) => {
                error!(?trigger, error = %e, "Reconcile task did not complete");
                return;
            }
        };

        let record = reconciliation.record(&self.identity);
        debug!(
            ?trigger,
            phase = %record.result.phase,
            coverage = %record.result.coverage,
            "Storing coverage record"
        );
        self.state.store(CoverageSnapshot {
            record,
            reconciled_at: Utc::now(),
            trigger,
        });
    }

    /// Start the loop in the background. It exits once `shutdown` turns true.
    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let (events_tx, mut events_rx) = mpsc::unbounded_channel();
            // Dropping the watcher stops the events, so it lives as long as the loop.
            let _watcher = self
                .config
                .watch_dir
                .as_ref()
                .and_then(|dir| match spawn_watcher(dir, events_tx) {
                    Ok(watcher) => {
                        info!(path = %dir.display(), "Watching manifest directory");
                        Some(watcher)
                    }
                    Err(e) => {
                        warn!(
                            path = %dir.display(),
                            error = %e,
                            "Manifest watch disabled, relying on the interval"
                        );
                        None
                    }
                });

            self.run_once(TriggerSource::Startup).await;

            let period = self.config.interval;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval = %humantime::format_duration(period),
                "Reconcile loop started"
            );

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        self.run_once(TriggerSource::Interval).await;
                    }
                    Some(()) = events_rx.recv() => {
                        // A configmap update fires several events; one run covers them all.
                        while events_rx.try_recv().is_ok() {}
                        self.run_once(TriggerSource::Watch).await;
                    }
                }
            }
            info!("Reconcile loop stopped");
        })
    }
}

fn spawn_watcher(
    dir: &std::path::Path,
    events: mpsc::UnboundedSender<()>,
) -> notify::Result<notify::RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if event.kind.is_access() => {}
        Ok(event) => {
            debug!(kind = ?event.kind, paths = ?event.paths, "Manifest directory changed");
            let _ = events.send(());
        }
        Err(e) => warn!(error = %e, "Manifest watch error"),
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

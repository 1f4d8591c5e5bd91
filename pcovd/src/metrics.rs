//! Prometheus metrics for the coverage daemon.
//!
//! All metrics live under the `e2emet` namespace:
//! - `e2emet_controller_sync_call_count{name,type,status}`
//! - `e2emet_planned_test_count{component,feature,kind,testimpltype}`
//! - `e2emet_actual_test_count{component,feature,kind,testimpltype}`
//! - `e2emet_manifest_load_duration_seconds{role,status}`

use lazy_static::lazy_static;
use pcov::{
    ControllerLabels, LoadStatus, ManifestRole, MetricsSink, TestCountGauge, TestCountLabels,
};
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use thiserror::Error;
use tracing::warn;

pub const NAMESPACE: &str = "e2emet";

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

const TEST_COUNT_LABELS: &[&str] = &["component", "feature", "kind", "testimpltype"];

lazy_static! {
    /// Process-wide registry served by the HTTP endpoint.
    static ref REGISTRY: Registry = Registry::new();
}

pub fn default_registry() -> &'static Registry {
    &REGISTRY
}

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Register(#[source] prometheus::Error),
    #[error("failed to encode metrics: {0}")]
    Encode(#[source] prometheus::Error),
    #[error("encoded metrics are not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// [`MetricsSink`] backed by a Prometheus registry.
#[derive(Clone)]
pub struct PrometheusSink {
    sync_calls: IntCounterVec,
    planned_tests: GaugeVec,
    actual_tests: GaugeVec,
    load_duration: HistogramVec,
}

impl PrometheusSink {
    /// Create the collectors and register them with `registry`.
    pub fn register(registry: &Registry) -> Result<Self, MetricsError> {
        let sync_calls = IntCounterVec::new(
            Opts::new(
                "controller_sync_call_count",
                "Number of reconcile calls made by the coverage controller",
            )
            .namespace(NAMESPACE),
            &["name", "type", "status"],
        )
        .map_err(MetricsError::Register)?;

        let planned_tests = GaugeVec::new(
            Opts::new(
                "planned_test_count",
                "Number of test cases listed in the master plan",
            )
            .namespace(NAMESPACE),
            TEST_COUNT_LABELS,
        )
        .map_err(MetricsError::Register)?;

        let actual_tests = GaugeVec::new(
            Opts::new(
                "actual_test_count",
                "Number of test cases implemented in the CI manifest",
            )
            .namespace(NAMESPACE),
            TEST_COUNT_LABELS,
        )
        .map_err(MetricsError::Register)?;

        let load_duration = HistogramVec::new(
            HistogramOpts::new(
                "manifest_load_duration_seconds",
                "Time taken to read one manifest file",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["role", "status"],
        )
        .map_err(MetricsError::Register)?;

        registry
            .register(Box::new(sync_calls.clone()))
            .map_err(MetricsError::Register)?;
        registry
            .register(Box::new(planned_tests.clone()))
            .map_err(MetricsError::Register)?;
        registry
            .register(Box::new(actual_tests.clone()))
            .map_err(MetricsError::Register)?;
        registry
            .register(Box::new(load_duration.clone()))
            .map_err(MetricsError::Register)?;

        Ok(Self {
            sync_calls,
            planned_tests,
            actual_tests,
            load_duration,
        })
    }
}

/// Render every metric of `registry` in text exposition format.
pub fn encode_metrics(registry: &Registry) -> Result<String, MetricsError> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .map_err(MetricsError::Encode)?;
    Ok(String::from_utf8(buffer)?)
}

impl MetricsSink for PrometheusSink {
    fn increment_counter(&self, labels: &ControllerLabels) {
        self.sync_calls
            .with_label_values(&[labels.name, labels.operation, labels.status.as_str()])
            .inc();
    }

    fn set_gauge(&self, gauge: TestCountGauge, labels: &TestCountLabels, value: f64) {
        let vec = match gauge {
            TestCountGauge::Planned => &self.planned_tests,
            TestCountGauge::Actual => &self.actual_tests,
        };
        let values = [
            labels.component.as_str(),
            labels.feature.as_str(),
            labels.kind.as_str(),
            labels.test_impl_type.as_str(),
        ];
        match vec.get_metric_with_label_values(&values) {
            Ok(g) => g.set(value),
            Err(e) => warn!(?gauge, error = %e, "Failed to set test count gauge"),
        }
    }

    fn observe_load_duration(&self, role: ManifestRole, status: LoadStatus, seconds: f64) {
        self.load_duration
            .with_label_values(&[role.as_str(), status.as_str()])
            .observe(seconds);
    }
}

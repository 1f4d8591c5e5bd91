//! Metrics sink interface.
//!
//! The engine never touches a metrics registry directly. Hosts pass a
//! [`MetricsSink`] in, so the engine can be exercised without a running
//! metrics server. Implementations must tolerate concurrent calls from
//! overlapping reconciliations; the only mutations are counter increments
//! and gauge sets.

use crate::manifest::ManifestRole;
use std::sync::Mutex;
use tracing::debug;

/// Name reported on the reconcile counter.
pub const CONTROLLER_NAME: &str = "pipeline-coverage-controller";

/// Operation type reported on the reconcile counter.
pub const OPERATION_SYNC: &str = "sync";

/// Status label of a reconciliation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileStatus {
    Passed,
    Failed,
}

impl ReconcileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

/// Labels of `controller_sync_call_count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerLabels {
    pub name: &'static str,
    pub operation: &'static str,
    pub status: ReconcileStatus,
}

impl ControllerLabels {
    pub fn sync(status: ReconcileStatus) -> Self {
        Self {
            name: CONTROLLER_NAME,
            operation: OPERATION_SYNC,
            status,
        }
    }
}

/// The two test-count gauges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestCountGauge {
    /// Desired test cases (`planned_test_count`).
    Planned,
    /// Actual test cases (`actual_test_count`).
    Actual,
}

/// Labels of the test-count gauges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCountLabels {
    pub component: String,
    pub feature: String,
    pub kind: String,
    pub test_impl_type: String,
}

impl Default for TestCountLabels {
    fn default() -> Self {
        Self {
            component: String::new(),
            feature: String::new(),
            kind: String::new(),
            test_impl_type: "litmus".to_string(),
        }
    }
}

/// Outcome label of a single manifest file load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStatus {
    Passed,
    Failed,
}

impl LoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

/// Counter/gauge capability set the engine reports into.
pub trait MetricsSink: Send + Sync {
    /// Count one reconciliation attempt.
    fn increment_counter(&self, labels: &ControllerLabels);

    /// Record the last-seen number of test cases.
    fn set_gauge(&self, gauge: TestCountGauge, labels: &TestCountLabels, value: f64);

    /// Record how long one manifest file took to load.
    fn observe_load_duration(&self, _role: ManifestRole, _status: LoadStatus, _seconds: f64) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn increment_counter(&self, _labels: &ControllerLabels) {}

    fn set_gauge(&self, _gauge: TestCountGauge, _labels: &TestCountLabels, _value: f64) {}
}

/// Emits every metric update as a `debug` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn increment_counter(&self, labels: &ControllerLabels) {
        debug!(
            name = labels.name,
            operation = labels.operation,
            status = labels.status.as_str(),
            "controller_sync_call_count += 1"
        );
    }

    fn set_gauge(&self, gauge: TestCountGauge, labels: &TestCountLabels, value: f64) {
        debug!(
            ?gauge,
            testimpltype = %labels.test_impl_type,
            value,
            "test count gauge set"
        );
    }

    fn observe_load_duration(&self, role: ManifestRole, status: LoadStatus, seconds: f64) {
        debug!(
            role = role.as_str(),
            status = status.as_str(),
            seconds,
            "manifest load duration"
        );
    }
}

/// A captured sink call.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Counter(ControllerLabels),
    Gauge {
        gauge: TestCountGauge,
        labels: TestCountLabels,
        value: f64,
    },
    LoadDuration {
        role: ManifestRole,
        status: LoadStatus,
    },
}

/// Keeps every call in memory, for assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: SinkEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Counter increments in call order.
    pub fn counters(&self) -> Vec<ControllerLabels> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Counter(labels) => Some(labels),
                _ => None,
            })
            .collect()
    }

    /// Most recent value set on `gauge`.
    pub fn last_gauge(&self, gauge: TestCountGauge) -> Option<f64> {
        self.events().into_iter().rev().find_map(|event| match event {
            SinkEvent::Gauge {
                gauge: g, value, ..
            } if g == gauge => Some(value),
            _ => None,
        })
    }

    /// Load-duration observations in call order.
    pub fn load_durations(&self) -> Vec<(ManifestRole, LoadStatus)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::LoadDuration { role, status } => Some((role, status)),
                _ => None,
            })
            .collect()
    }
}

impl MetricsSink for RecordingSink {
    fn increment_counter(&self, labels: &ControllerLabels) {
        self.push(SinkEvent::Counter(labels.clone()));
    }

    fn set_gauge(&self, gauge: TestCountGauge, labels: &TestCountLabels, value: f64) {
        self.push(SinkEvent::Gauge {
            gauge,
            labels: labels.clone(),
            value,
        });
    }

    fn observe_load_duration(&self, role: ManifestRole, status: LoadStatus, _seconds: f64) {
        self.push(SinkEvent::LoadDuration { role, status });
    }
}

//! Coverage reconciliation.
//!
//! Partitions actual test cases into valid (also desired) and invalid, computes
//! the coverage ratio against the desired set, and projects the result into a
//! [`PipelineCoverage`] record. A reconciliation never fails outward: load
//! errors end up in the outcome's phase and reason.

use crate::manifest::{ManifestConfig, ManifestError, ManifestLoader, TestCaseSets};
use crate::percent::Percentage;
use crate::sink::{ControllerLabels, MetricsSink, ReconcileStatus};
use pcov_common::types::{
    API_VERSION, CoverageResult, CoverageSpec, KIND_PIPELINE_COVERAGE, ObjectMeta, Phase,
    PipelineCoverage, PipelineRef, RecordIdentity, TestSpec,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Warning added when the desired manifest yields no test cases.
pub const MISSING_DESIRED_WARNING: &str = "Missing desired tests";

/// Result of one reconciliation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageOutcome {
    pub phase: Phase,
    pub coverage_ratio: f64,
    pub desired_count: usize,
    pub valid_tests: Vec<String>,
    pub invalid_tests: Vec<String>,
    pub warnings: Vec<String>,
    pub deprecated: Vec<String>,
    pub failure_reason: Option<String>,
}

impl CoverageOutcome {
    /// Compute the outcome from loaded sets and the load error, if any.
    pub fn compute(sets: &TestCaseSets, load_error: Option<&ManifestError>) -> Self {
        let (valid_tests, invalid_tests): (Vec<String>, Vec<String>) = sets
            .actual
            .iter()
            .cloned()
            .partition(|tcid| sets.desired.contains(tcid));

        let mut warnings = Vec::new();
        if !invalid_tests.is_empty() {
            warnings.push(format!(
                "{} invalid tests were found [{}]",
                invalid_tests.len(),
                invalid_tests.join(", ")
            ));
        }

        let desired_count = sets.desired.len();
        let coverage_ratio = if desired_count == 0 {
            warnings.push(MISSING_DESIRED_WARNING.to_string());
            0.0
        } else {
            debug!(
                formula = %format!("{}/{}*100", valid_tests.len(), desired_count),
                "Coverage calculation"
            );
            valid_tests.len() as f64 / desired_count as f64
        };

        let (phase, failure_reason) = match load_error {
            Some(e) => (Phase::Failed, Some(e.to_string())),
            None => (Phase::Passed, None),
        };

        Self {
            phase,
            coverage_ratio,
            desired_count,
            valid_tests,
            invalid_tests,
            warnings,
            deprecated: sets.deprecated.clone(),
            failure_reason,
        }
    }

    pub fn valid_count(&self) -> usize {
        self.valid_tests.len()
    }

    pub fn invalid_count(&self) -> usize {
        self.invalid_tests.len()
    }

    pub fn coverage(&self) -> Percentage {
        Percentage::from_ratio(self.coverage_ratio)
    }

    /// `"<n> warnings: w1: w2"`, or empty.
    pub fn warning_summary(&self) -> String {
        summarize(&self.warnings, "warnings")
    }

    /// `"<n> deprecations: id1: id2"`, or empty.
    pub fn deprecated_summary(&self) -> String {
        summarize(&self.deprecated, "deprecations")
    }

    /// Project into the persisted record. Identical inputs give identical records.
    pub fn to_record(&self, identity: &RecordIdentity) -> PipelineCoverage {
        PipelineCoverage {
            api_version: API_VERSION.to_string(),
            kind: KIND_PIPELINE_COVERAGE.to_string(),
            metadata: ObjectMeta {
                name: identity.name.clone(),
                namespace: identity.namespace.clone(),
            },
            spec: CoverageSpec {
                pipeline: PipelineRef {
                    id: identity.pipeline_id.clone(),
                },
                test: TestSpec {
                    count: self.desired_count as u64,
                },
            },
            result: CoverageResult {
                phase: self.phase,
                reason: self.failure_reason.clone().unwrap_or_default(),
                warning: self.warning_summary(),
                deprecated: self.deprecated_summary(),
                run_id: identity.run_id.clone(),
                valid_test_count: self.valid_count() as u64,
                invalid_test_count: self.invalid_count() as u64,
                coverage: self.coverage().to_string(),
            },
        }
    }
}

fn summarize(items: &[String], noun: &str) -> String {
    if items.is_empty() {
        return String::new();
    }
    format!("{} {}: {}", items.len(), noun, items.join(": "))
}

/// An outcome that is always complete, plus the error that degraded it.
#[derive(Debug)]
pub struct Reconciliation {
    pub outcome: CoverageOutcome,
    pub error: Option<ManifestError>,
}

impl Reconciliation {
    pub fn is_failed(&self) -> bool {
        self.outcome.phase == Phase::Failed
    }

    pub fn record(&self, identity: &RecordIdentity) -> PipelineCoverage {
        self.outcome.to_record(identity)
    }
}

/// Anything a scheduler can invoke to recompute coverage.
pub trait Reconcile: Send + Sync {
    fn reconcile(&self) -> Reconciliation;
}

/// Reconciles the manifests of one directory.
pub struct CoverageEngine {
    config: ManifestConfig,
    sink: Arc<dyn MetricsSink>,
}

impl CoverageEngine {
    pub fn new(config: ManifestConfig, sink: Arc<dyn MetricsSink>) -> Self {
        Self { config, sink }
    }

    pub fn config(&self) -> &ManifestConfig {
        &self.config
    }

    /// Load the manifests, or empty sets when loading fails.
    pub fn load_or_empty(&self) -> (TestCaseSets, Option<ManifestError>) {
        ManifestLoader::new(&self.config, self.sink.as_ref()).load_or_empty()
    }
}

impl Reconcile for CoverageEngine {
    fn reconcile(&self) -> Reconciliation {
        let (sets, load_error) = self.load_or_empty();
        if let Some(e) = &load_error {
            error!(
                path = %self.config.directory.display(),
                error = %e,
                "Failed to reconcile"
            );
        }

        let outcome = CoverageOutcome::compute(&sets, load_error.as_ref());

        let status = if load_error.is_some() {
            ReconcileStatus::Failed
        } else {
            ReconcileStatus::Passed
        };
        self.sink.increment_counter(&ControllerLabels::sync(status));

        info!(
            phase = %outcome.phase,
            coverage = %outcome.coverage(),
            valid = outcome.valid_count(),
            invalid = outcome.invalid_count(),
            warnings = outcome.warnings.len(),
            "Reconcile completed"
        );

        Reconciliation {
            outcome,
            error: load_error,
        }
    }
}

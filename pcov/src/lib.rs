//! Pipeline test coverage engine.
//!
//! Compares the test cases planned in a master plan manifest against the test
//! cases implemented in a CI manifest and reports the coverage.
//!
//! - [`manifest`]: reads the manifest directory into [`TestCaseSets`]
//! - [`coverage`]: turns the sets into a [`CoverageOutcome`] and its record
//! - [`sink`]: the counter/gauge interface the engine reports into

pub mod coverage;
pub mod manifest;
pub mod percent;
pub mod sink;

pub use coverage::{CoverageEngine, CoverageOutcome, Reconcile, Reconciliation};
pub use manifest::{
    ManifestConfig, ManifestError, ManifestLoader, ManifestRole, ManifestSyntax, TestCaseSets,
};
pub use percent::Percentage;
pub use sink::{
    ControllerLabels, LoadStatus, MetricsSink, NoopSink, ReconcileStatus, RecordingSink,
    TestCountGauge, TestCountLabels, TracingSink,
};

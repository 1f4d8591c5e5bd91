//! The `PipelineCoverage` record produced by every reconciliation.
//!
//! The layout mirrors the custom resource the coverage controller has always
//! published, so existing dashboards and persistence hooks keep working.
//! `status` is called `result` because the attachment's status is not synced
//! by the host that stores the record.

use schemars::JsonSchema;
use schemars::schema::RootSchema;
use schemars::schema_for;
use serde::{Deserialize, Serialize};

/// API version of the record.
pub const API_VERSION: &str = "e2e-metrics.mayadata.io/v1alpha1";

/// Kind of the record.
pub const KIND_PIPELINE_COVERAGE: &str = "PipelineCoverage";

/// Infrastructure outcome of a reconciliation.
///
/// `Failed` means the manifests could not be loaded. A 0% coverage with no
/// load error is still `Passed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Phase {
    Passed,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "Passed",
            Self::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields of the record that the host supplies. None are computed by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordIdentity {
    pub name: String,
    pub namespace: String,
    pub pipeline_id: String,
    pub run_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineRef {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TestSpec {
    /// Number of desired test cases.
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CoverageSpec {
    pub pipeline: PipelineRef,
    pub test: TestSpec,
}

/// Result section of the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoverageResult {
    pub phase: Phase,
    /// Load error, empty unless `phase` is `Failed`.
    pub reason: String,
    /// `"<n> warnings: w1: w2"`, or empty.
    pub warning: String,
    /// `"<n> deprecations: id1: id2"`, or empty.
    pub deprecated: String,
    #[serde(rename = "runid")]
    pub run_id: String,
    pub valid_test_count: u64,
    pub invalid_test_count: u64,
    /// Rounded percentage, e.g. `"60%"`.
    pub coverage: String,
}

/// The structured outcome of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineCoverage {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: CoverageSpec,
    pub result: CoverageResult,
}

impl PipelineCoverage {
    /// Serialize to compact JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// JSON Schema of the [`PipelineCoverage`] record.
#[must_use]
pub fn generate_coverage_schema() -> RootSchema {
    schema_for!(PipelineCoverage)
}

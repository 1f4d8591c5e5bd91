//! Integration tests for the load-and-reconcile flow.
//!
//! Runs the engine against checked-in and temporary manifest directories and
//! checks the record it produces along with the metrics it reports.

mod common;

use common::{fixture_dir, init_test_logging, manifest_dir};
use pcov::sink::SinkEvent;
use pcov::{
    ControllerLabels, CoverageEngine, LoadStatus, ManifestConfig, ManifestError, ManifestLoader,
    ManifestRole, Reconcile, ReconcileStatus, RecordingSink, TestCountGauge,
};
use pcov_common::testing::{TestLogger, TestPhase};
use pcov_common::{Phase, RecordIdentity};
use std::sync::Arc;
use tracing::info;

fn identity() -> RecordIdentity {
    RecordIdentity {
        name: "localpv-coverage".to_string(),
        namespace: "e2e-metrics".to_string(),
        pipeline_id: "1841".to_string(),
        run_id: "release-branch-7".to_string(),
    }
}

// ============================================================================
// Fixture pipeline
// ============================================================================

#[test]
fn test_fixture_manifests_load() {
    init_test_logging();
    info!("TEST START: test_fixture_manifests_load");

    let config = ManifestConfig::new(fixture_dir("pipeline"));
    let sink = RecordingSink::new();
    let sets = ManifestLoader::new(&config, &sink).load().unwrap();

    info!(
        desired = sets.desired.len(),
        actual = sets.actual.len(),
        "VERIFY: fixture sets"
    );
    assert_eq!(sets.desired.len(), 4);
    assert!(sets.desired.contains("TCID-DIR-UPGRADE"));
    assert_eq!(
        sets.actual.iter().map(String::as_str).collect::<Vec<_>>(),
        vec![
            "TCID-DIR-HEALTH-CHECK-V2",
            "TCID-DIR-INSTALL-ON-LOCAL-PV",
            "TCID-DIR-SNAPSHOT"
        ]
    );
    assert_eq!(
        sets.deprecated,
        vec!["tcid-dir-health-check-v2", "tcid-DIR-HEALTH-CHECK"]
    );
    assert_eq!(
        sink.load_durations(),
        vec![
            (ManifestRole::Actual, LoadStatus::Passed),
            (ManifestRole::Desired, LoadStatus::Passed)
        ]
    );

    info!("TEST PASS: test_fixture_manifests_load");
}

#[test]
fn test_fixture_pipeline_record() {
    init_test_logging();
    info!("TEST START: test_fixture_pipeline_record");

    let sink = Arc::new(RecordingSink::new());
    let engine = CoverageEngine::new(ManifestConfig::new(fixture_dir("pipeline")), sink.clone());
    let reconciliation = engine.reconcile();
    assert!(reconciliation.error.is_none());

    let record = reconciliation.record(&identity());
    info!(record = %record.to_json().unwrap(), "VERIFY: record");

    assert_eq!(record.metadata.name, "localpv-coverage");
    assert_eq!(record.spec.pipeline.id, "1841");
    assert_eq!(record.spec.test.count, 4);
    assert_eq!(record.result.phase, Phase::Passed);
    assert_eq!(record.result.reason, "");
    assert_eq!(record.result.run_id, "release-branch-7");
    assert_eq!(record.result.valid_test_count, 2);
    assert_eq!(record.result.invalid_test_count, 1);
    assert_eq!(record.result.coverage, "50%");
    assert_eq!(
        record.result.warning,
        "1 warnings: 1 invalid tests were found [TCID-DIR-SNAPSHOT]"
    );
    assert_eq!(
        record.result.deprecated,
        "2 deprecations: tcid-dir-health-check-v2: tcid-DIR-HEALTH-CHECK"
    );

    assert_eq!(sink.last_gauge(TestCountGauge::Planned), Some(4.0));
    assert_eq!(sink.last_gauge(TestCountGauge::Actual), Some(3.0));
    assert_eq!(
        sink.counters(),
        vec![ControllerLabels::sync(ReconcileStatus::Passed)]
    );

    info!("TEST PASS: test_fixture_pipeline_record");
}

#[test]
fn test_record_json_shape() {
    init_test_logging();

    let engine = CoverageEngine::new(
        ManifestConfig::new(fixture_dir("pipeline")),
        Arc::new(RecordingSink::new()),
    );
    let record = engine.reconcile().record(&identity());
    let value: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();

    assert_eq!(value["apiVersion"], "e2e-metrics.mayadata.io/v1alpha1");
    assert_eq!(value["kind"], "PipelineCoverage");
    assert_eq!(value["metadata"]["namespace"], "e2e-metrics");
    assert_eq!(value["spec"]["test"]["count"], 4);
    assert_eq!(value["result"]["runid"], "release-branch-7");
    assert_eq!(value["result"]["validTestCount"], 2);
    assert_eq!(value["result"]["invalidTestCount"], 1);
    assert_eq!(value["result"]["phase"], "Passed");
}

// ============================================================================
// Edge cases
// ============================================================================

#[test]
fn test_full_coverage_with_custom_file_names() {
    init_test_logging();

    let dir = manifest_dir(&[
        ("plan.yaml", "- tcid: TCID-A\n- tcid: TCID-B\n"),
        ("ci.yaml", "TCID-A:\n  script: a\nTCID-B:\n  script: b\n"),
        (".master-plan.yml", "- tcid: TCID-IGNORED\n"),
    ]);
    let config = ManifestConfig::new(dir.path()).with_file_names("plan.yaml", "ci.yaml");
    let engine = CoverageEngine::new(config, Arc::new(RecordingSink::new()));

    let record = engine.reconcile().record(&RecordIdentity::default());
    assert_eq!(record.result.coverage, "100%");
    assert_eq!(record.spec.test.count, 2);
    assert_eq!(record.result.warning, "");
}

#[test]
fn test_one_of_three_desired() {
    init_test_logging();

    let dir = manifest_dir(&[
        (
            ".master-plan.yml",
            "- tcid: TCID-101\n- tcid: TCID-201\n- tcid: TCID-301\n",
        ),
        (".gitlab-ci.yml", "TCID-101:\n"),
    ]);
    let engine = CoverageEngine::new(
        ManifestConfig::new(dir.path()),
        Arc::new(RecordingSink::new()),
    );

    let record = engine.reconcile().record(&RecordIdentity::default());
    assert_eq!(record.result.coverage, "33%");
    assert_eq!(record.result.warning, "");
}

#[test]
fn test_only_actual_manifest_present() {
    init_test_logging();

    let dir = manifest_dir(&[(".gitlab-ci.yml", "TCID-101:\n")]);
    let engine = CoverageEngine::new(
        ManifestConfig::new(dir.path()),
        Arc::new(RecordingSink::new()),
    );

    let record = engine.reconcile().record(&RecordIdentity::default());
    assert_eq!(record.result.phase, Phase::Passed);
    assert_eq!(record.result.coverage, "0%");
    assert_eq!(record.result.invalid_test_count, 1);
    assert_eq!(
        record.result.warning,
        "2 warnings: 1 invalid tests were found [TCID-101]: Missing desired tests"
    );
}

#[test]
fn test_missing_directory_degrades_to_failed_record() {
    init_test_logging();
    info!("TEST START: test_missing_directory_degrades_to_failed_record");

    let dir = manifest_dir(&[]);
    let missing = dir.path().join("not-mounted");
    let sink = Arc::new(RecordingSink::new());
    let engine = CoverageEngine::new(ManifestConfig::new(&missing), sink.clone());

    let reconciliation = engine.reconcile();
    assert!(matches!(
        reconciliation.error,
        Some(ManifestError::DirectoryRead { .. })
    ));

    let record = reconciliation.record(&identity());
    assert_eq!(record.result.phase, Phase::Failed);
    assert!(record.result.reason.contains("not-mounted"));
    assert_eq!(record.result.coverage, "0%");
    assert_eq!(record.result.valid_test_count, 0);
    assert_eq!(record.result.invalid_test_count, 0);
    assert_eq!(record.spec.test.count, 0);
    assert_eq!(record.result.warning, "1 warnings: Missing desired tests");

    // Gauges are left alone on a failed load.
    assert!(
        !sink
            .events()
            .iter()
            .any(|event| matches!(event, SinkEvent::Gauge { .. }))
    );
    assert_eq!(
        sink.counters(),
        vec![ControllerLabels::sync(ReconcileStatus::Failed)]
    );

    info!("TEST PASS: test_missing_directory_degrades_to_failed_record");
}

#[test]
fn test_engine_recovers_once_manifests_appear() {
    init_test_logging();
    let logger = TestLogger::for_test("test_engine_recovers_once_manifests_appear");

    let dir = manifest_dir(&[]);
    let sink = Arc::new(RecordingSink::new());
    let engine = CoverageEngine::new(ManifestConfig::new(dir.path()), sink.clone());

    logger.log(TestPhase::Execute, "reconcile empty directory");
    let first = engine.reconcile();
    assert!(matches!(
        first.error,
        Some(ManifestError::NoManifestsFound { .. })
    ));

    std::fs::write(dir.path().join(".master-plan.yml"), "- tcid: TCID-A\n").unwrap();
    std::fs::write(dir.path().join(".gitlab-ci.yml"), "TCID-A:\n").unwrap();

    logger.log(TestPhase::Execute, "reconcile after manifests appear");
    let second = engine.reconcile();
    logger.log_with_data(
        TestPhase::Verify,
        "second reconciliation",
        serde_json::json!({
            "phase": second.outcome.phase,
            "coverage": second.outcome.coverage().to_string(),
        }),
    );
    assert!(second.error.is_none());
    assert_eq!(second.outcome.coverage().to_string(), "100%");
    assert_eq!(
        sink.counters(),
        vec![
            ControllerLabels::sync(ReconcileStatus::Failed),
            ControllerLabels::sync(ReconcileStatus::Passed)
        ]
    );

    logger.pass();
}

#[test]
fn test_latin1_comment_in_ci_manifest_still_passes() {
    init_test_logging();

    let dir = manifest_dir(&[(".master-plan.yml", "- tcid: TCID-A\n")]);
    std::fs::write(
        dir.path().join(".gitlab-ci.yml"),
        b"# owner: Ren\xe9\nTCID-A:\n",
    )
    .unwrap();
    let engine = CoverageEngine::new(
        ManifestConfig::new(dir.path()),
        Arc::new(RecordingSink::new()),
    );

    let reconciliation = engine.reconcile();
    assert!(reconciliation.error.is_none());
    let record = reconciliation.record(&RecordIdentity::default());
    assert_eq!(record.result.phase, Phase::Passed);
    assert_eq!(record.result.coverage, "100%");
    assert_eq!(record.result.reason, "");
}

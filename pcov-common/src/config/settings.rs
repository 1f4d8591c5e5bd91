//! Resolved settings shared by the `pcov` CLI and the `pcovd` daemon.

use super::env::{EnvError, EnvParser};
use super::source::Sourced;
use crate::types::RecordIdentity;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MANIFEST_DIR: &str = "/etc/config/e2e-metrics/";
pub const DEFAULT_DESIRED_FILE: &str = ".master-plan.yml";
pub const DEFAULT_ACTUAL_FILE: &str = ".gitlab-ci.yml";
pub const DEFAULT_DESIRED_PREFIX: &str = "- tcid:";
pub const DEFAULT_ACTUAL_PREFIX: &str = "TCID-";
pub const DEFAULT_DEPRECATED_PREFIX: &str = "tcid-";
pub const DEFAULT_TEST_IMPL_TYPE: &str = "litmus";
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9898";
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 30;

/// Every knob the engine and its hosts read from the environment.
#[derive(Debug, Clone)]
pub struct CoverageSettings {
    pub manifest_dir: Sourced<PathBuf>,
    pub desired_file: Sourced<String>,
    pub actual_file: Sourced<String>,
    pub desired_prefix: Sourced<String>,
    pub actual_prefix: Sourced<String>,
    pub deprecated_prefix: Sourced<String>,
    pub test_impl_type: Sourced<String>,
    pub log_level: Sourced<String>,
    pub log_format: Sourced<String>,
    pub log_file: Sourced<Option<PathBuf>>,
    pub reconcile_interval_secs: Sourced<u64>,
    pub watch: Sourced<bool>,
    pub metrics_addr: Sourced<String>,
    pub identity: RecordIdentity,
}

impl CoverageSettings {
    /// Resolve settings from the process environment.
    ///
    /// Invalid values fall back to their defaults; the errors are returned
    /// so the caller can log them once logging is up.
    pub fn from_env() -> (Self, Vec<EnvError>) {
        let mut parser = EnvParser::new();
        let settings = Self {
            manifest_dir: parser.get_path("MANIFEST_DIR", DEFAULT_MANIFEST_DIR),
            desired_file: parser.get_non_empty_string("DESIRED_FILE", DEFAULT_DESIRED_FILE),
            actual_file: parser.get_non_empty_string("ACTUAL_FILE", DEFAULT_ACTUAL_FILE),
            desired_prefix: parser.get_non_empty_string("DESIRED_PREFIX", DEFAULT_DESIRED_PREFIX),
            actual_prefix: parser.get_non_empty_string("ACTUAL_PREFIX", DEFAULT_ACTUAL_PREFIX),
            deprecated_prefix: parser
                .get_non_empty_string("DEPRECATED_PREFIX", DEFAULT_DEPRECATED_PREFIX),
            test_impl_type: parser.get_choice(
                "TEST_IMPL_TYPE",
                DEFAULT_TEST_IMPL_TYPE,
                &["litmus", "dope"],
            ),
            log_level: parser.get_log_level("LOG_LEVEL", "info"),
            log_format: parser.get_choice("LOG_FORMAT", "pretty", &["pretty", "json"]),
            log_file: parser.get_optional_path("LOG_FILE"),
            reconcile_interval_secs: parser.get_u64_range(
                "RECONCILE_INTERVAL_SECS",
                DEFAULT_RECONCILE_INTERVAL_SECS,
                1,
                86_400,
            ),
            watch: parser.get_bool("WATCH", true),
            metrics_addr: parser.get_non_empty_string("METRICS_ADDR", DEFAULT_METRICS_ADDR),
            identity: identity_from_env(),
        };
        (settings, parser.take_errors())
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs.value)
    }
}

/// Host-supplied identity of the record, read from the deployment environment.
fn identity_from_env() -> RecordIdentity {
    let mut parser = EnvParser::with_prefix("");
    let mut read = |name: &str| {
        parser
            .get_optional_string(name)
            .into_value()
            .unwrap_or_default()
    };
    RecordIdentity {
        name: read("E2E_METRICS_COVERAGE_NAME"),
        namespace: read("MY_POD_NAMESPACE"),
        pipeline_id: read("E2E_METRICS_PIPELINE_ID"),
        run_id: read("E2E_METRICS_RUN_ID"),
    }
}

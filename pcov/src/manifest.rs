//! Manifest loading.
//!
//! Reads the manifest directory and extracts test case identifiers from the
//! two recognized files: the planning manifest (desired test cases, lines like
//! `- tcid: miot1x`) and the CI manifest (actual test cases, job keys like
//! `TCID-DIR-HEALTH-CHECK:`). Only prefix-matched lines carry meaning; this is
//! not a YAML parser.

use crate::sink::{LoadStatus, MetricsSink, TestCountGauge, TestCountLabels};
use pcov_common::CoverageSettings;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Errors that abort a manifest load.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest directory {path:?}: {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no manifests found at {path:?}")]
    NoManifestsFound { path: PathBuf },

    #[error("failed to parse {path:?}: {source}")]
    FileParse {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Which of the two manifests a file plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestRole {
    Desired,
    Actual,
}

impl ManifestRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desired => "desired",
            Self::Actual => "actual",
        }
    }
}

/// Line prefixes that mark test case identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSyntax {
    /// Desired manifest entry prefix, e.g. `- tcid:`.
    pub desired_prefix: String,
    /// Separates the key from the identifier on a desired line.
    pub desired_delimiter: String,
    /// Actual manifest job prefix, e.g. `TCID-`.
    pub actual_prefix: String,
    /// Legacy lowercase job prefix, e.g. `tcid-`.
    pub deprecated_prefix: String,
}

impl Default for ManifestSyntax {
    fn default() -> Self {
        Self {
            desired_prefix: "- tcid:".to_string(),
            desired_delimiter: ": ".to_string(),
            actual_prefix: "TCID-".to_string(),
            deprecated_prefix: "tcid-".to_string(),
        }
    }
}

/// Classification of a line in the actual manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActualLine<'a> {
    Actual(&'a str),
    Deprecated(&'a str),
}

impl ManifestSyntax {
    /// Extract a desired identifier from one line.
    ///
    /// The line must split on the delimiter into exactly two parts; anything
    /// else is skipped, never an error.
    pub fn parse_desired_line<'a>(&self, line: &'a str) -> Option<&'a str> {
        let line = line.trim();
        if !line.starts_with(self.desired_prefix.as_str()) {
            return None;
        }
        let mut parts = line.split(self.desired_delimiter.as_str());
        let (_key, id) = (parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        let id = id.trim();
        (!id.is_empty()).then_some(id)
    }

    /// Classify one line of the actual manifest.
    ///
    /// The actual prefix is checked first, so a line matching both prefixes is
    /// registered once, as actual. One trailing colon is stripped.
    pub fn parse_actual_line<'a>(&self, line: &'a str) -> Option<ActualLine<'a>> {
        let line = line.trim();
        let strip = |l: &'a str| l.strip_suffix(':').unwrap_or(l);
        if line.starts_with(self.actual_prefix.as_str()) {
            Some(ActualLine::Actual(strip(line)))
        } else if line.starts_with(self.deprecated_prefix.as_str()) {
            Some(ActualLine::Deprecated(strip(line)))
        } else {
            None
        }
    }
}

/// Identifiers extracted from one load.
///
/// Sets are ordered so every derived string is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestCaseSets {
    pub desired: BTreeSet<String>,
    pub actual: BTreeSet<String>,
    /// Legacy-prefixed entries in discovery order, duplicates kept.
    pub deprecated: Vec<String>,
}

impl TestCaseSets {
    /// Register one raw line read from a file playing `role`.
    pub fn register_line(&mut self, role: ManifestRole, syntax: &ManifestSyntax, line: &str) {
        match role {
            ManifestRole::Desired => {
                if let Some(id) = syntax.parse_desired_line(line) {
                    trace!(tcid = id, "Registering desired tcid");
                    self.desired.insert(id.to_string());
                }
            }
            ManifestRole::Actual => match syntax.parse_actual_line(line) {
                Some(ActualLine::Actual(id)) => {
                    trace!(tcid = id, "Registering actual tcid");
                    self.actual.insert(id.to_string());
                }
                Some(ActualLine::Deprecated(id)) => {
                    trace!(tcid = id, "Registering deprecated tcid");
                    self.deprecated.push(id.to_string());
                }
                None => {}
            },
        }
    }
}

/// Where the manifests live and how to read them.
#[derive(Debug, Clone)]
pub struct ManifestConfig {
    pub directory: PathBuf,
    pub desired_file_name: String,
    pub actual_file_name: String,
    pub syntax: ManifestSyntax,
    pub gauge_labels: TestCountLabels,
}

impl ManifestConfig {
    /// Default file names and syntax for `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            desired_file_name: ".master-plan.yml".to_string(),
            actual_file_name: ".gitlab-ci.yml".to_string(),
            syntax: ManifestSyntax::default(),
            gauge_labels: TestCountLabels::default(),
        }
    }

    pub fn from_settings(settings: &CoverageSettings) -> Self {
        Self {
            directory: settings.manifest_dir.value.clone(),
            desired_file_name: settings.desired_file.value.clone(),
            actual_file_name: settings.actual_file.value.clone(),
            syntax: ManifestSyntax {
                desired_prefix: settings.desired_prefix.value.clone(),
                actual_prefix: settings.actual_prefix.value.clone(),
                deprecated_prefix: settings.deprecated_prefix.value.clone(),
                ..ManifestSyntax::default()
            },
            gauge_labels: TestCountLabels {
                test_impl_type: settings.test_impl_type.value.clone(),
                ..TestCountLabels::default()
            },
        }
    }

    #[must_use]
    pub fn with_file_names(
        mut self,
        desired: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        self.desired_file_name = desired.into();
        self.actual_file_name = actual.into();
        self
    }

    /// Role of a file name, if it is one of the two configured manifests.
    pub fn role_for(&self, file_name: &str) -> Option<ManifestRole> {
        if file_name == self.actual_file_name {
            Some(ManifestRole::Actual)
        } else if file_name == self.desired_file_name {
            Some(ManifestRole::Desired)
        } else {
            None
        }
    }
}

fn is_yaml_file_name(file_name: &str) -> bool {
    file_name.ends_with(".yaml") || file_name.ends_with(".yml")
}

/// Loads the manifests of one directory. Built fresh for every reconciliation.
pub struct ManifestLoader<'a> {
    config: &'a ManifestConfig,
    sink: &'a dyn MetricsSink,
}

impl<'a> ManifestLoader<'a> {
    pub fn new(config: &'a ManifestConfig, sink: &'a dyn MetricsSink) -> Self {
        Self { config, sink }
    }

    /// Load both manifests, or return empty sets along with the load error.
    pub fn load_or_empty(&self) -> (TestCaseSets, Option<ManifestError>) {
        match self.load() {
            Ok(sets) => (sets, None),
            Err(e) => (TestCaseSets::default(), Some(e)),
        }
    }

    /// Load both manifests.
    ///
    /// Fails as a unit: sets from files read before a failing one are
    /// discarded. Unrecognized entries are skipped without error.
    pub fn load(&self) -> Result<TestCaseSets, ManifestError> {
        let dir = &self.config.directory;
        debug!(path = %dir.display(), "Will load manifests");

        let mut entries = fs::read_dir(dir)
            .and_then(|iter| iter.collect::<io::Result<Vec<_>>>())
            .map_err(|source| ManifestError::DirectoryRead {
                path: dir.clone(),
                source,
            })?;
        if entries.is_empty() {
            return Err(ManifestError::NoManifestsFound { path: dir.clone() });
        }
        entries.sort_by_key(|entry| entry.file_name());

        let mut sets = TestCaseSets::default();
        for entry in entries {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();

            let file_type = entry
                .file_type()
                .map_err(|source| ManifestError::DirectoryRead {
                    path: dir.clone(),
                    source,
                })?;
            if file_type.is_dir() || (file_type.is_symlink() && path.is_dir()) {
                debug!(file = %file_name, "Will skip manifest: not a file");
                continue;
            }
            if !is_yaml_file_name(&file_name) {
                debug!(file = %file_name, "Will skip manifest: not a yaml file");
                continue;
            }
            let Some(role) = self.config.role_for(&file_name) else {
                debug!(
                    file = %file_name,
                    want_desired = %self.config.desired_file_name,
                    want_actual = %self.config.actual_file_name,
                    "Will skip manifest: unrecognized name"
                );
                continue;
            };

            debug!(file = %path.display(), role = role.as_str(), "Will load manifest");
            let started = Instant::now();
            let parsed = parse_file_by_line(&path, |line| {
                sets.register_line(role, &self.config.syntax, line);
            });
            let status = if parsed.is_ok() {
                LoadStatus::Passed
            } else {
                LoadStatus::Failed
            };
            self.sink
                .observe_load_duration(role, status, started.elapsed().as_secs_f64());
            parsed.map_err(|source| ManifestError::FileParse { path, source })?;
        }

        let labels = &self.config.gauge_labels;
        self.sink
            .set_gauge(TestCountGauge::Actual, labels, sets.actual.len() as f64);
        self.sink
            .set_gauge(TestCountGauge::Planned, labels, sets.desired.len() as f64);
        info!(
            path = %dir.display(),
            desired = sets.desired.len(),
            actual = sets.actual.len(),
            deprecated = sets.deprecated.len(),
            "Manifests loaded"
        );

        Ok(sets)
    }
}

/// Feed every non-blank line of `path` to `process`.
///
/// Lines are raw bytes; invalid UTF-8 is replaced rather than rejected, so
/// only open and read failures are errors.
fn parse_file_by_line(path: &Path, mut process: impl FnMut(&str)) -> io::Result<()> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let raw = buf
            .strip_suffix(b"\n")
            .map(|rest| rest.strip_suffix(b"\r").unwrap_or(rest))
            .unwrap_or(buf.as_slice());
        let line = String::from_utf8_lossy(raw);
        if line.trim().is_empty() {
            continue;
        }
        process(&line);
    }
}

//! Structured test logging.
//!
//! [`init_global_test_logging`] installs a subscriber once per test binary.
//! A [`TestLogger`] records the phases of one test and mirrors them as JSONL
//! into `<target>/test-logs/<test>.jsonl`, which CI keeps as an artifact.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{LineWriter, Write};
use std::path::PathBuf;
use std::sync::{Mutex, Once};
use std::time::Instant;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPhase {
    Setup,
    Execute,
    Verify,
    Teardown,
}

impl TestPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Execute => "execute",
            Self::Verify => "verify",
            Self::Teardown => "teardown",
        }
    }
}

impl std::fmt::Display for TestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static INIT: Once = Once::new();

/// Install the test subscriber. Safe to call from every test.
///
/// `PCOV_TEST_LOG_LEVEL` sets the level for the workspace crates (default
/// `info`). `PCOV_TEST_LOG_FILE` adds a JSON copy of every event.
pub fn init_global_test_logging() {
    INIT.call_once(|| {
        let level = std::env::var("PCOV_TEST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let filter = EnvFilter::try_new(format!(
            "pcov={level},pcovd={level},pcov_common={level}"
        ))
        .unwrap_or_else(|_| EnvFilter::new("info"));

        let json_file = std::env::var("PCOV_TEST_LOG_FILE")
            .ok()
            .and_then(|path| File::create(path).ok())
            .map(|file| {
                fmt::layer()
                    .json()
                    .with_writer(Mutex::new(file))
                    .with_file(true)
                    .with_line_number(true)
            });

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_test_writer().compact())
            .with(json_file);

        // Another harness may have installed a subscriber first.
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestLogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub test: String,
    pub phase: TestPhase,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub elapsed_ms: u64,
}

/// Phase log of one test.
pub struct TestLogger {
    test: String,
    started: Instant,
    entries: Mutex<Vec<TestLogEntry>>,
    jsonl: Option<Mutex<LineWriter<File>>>,
}

impl TestLogger {
    /// Start logging `test`; records the setup entry.
    pub fn for_test(test: &str) -> Self {
        let jsonl = open_jsonl(test).map(|file| Mutex::new(LineWriter::new(file)));
        let logger = Self {
            test: test.to_string(),
            started: Instant::now(),
            entries: Mutex::new(Vec::new()),
            jsonl,
        };
        logger.log(TestPhase::Setup, "TEST START");
        logger
    }

    pub fn log(&self, phase: TestPhase, message: impl Into<String>) {
        self.record(phase, message.into(), None);
    }

    pub fn log_with_data(
        &self,
        phase: TestPhase,
        message: impl Into<String>,
        data: serde_json::Value,
    ) {
        self.record(phase, message.into(), Some(data));
    }

    pub fn entries(&self) -> Vec<TestLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn pass(self) {
        self.log(TestPhase::Verify, "TEST PASS");
    }

    pub fn fail(self, reason: impl Into<String>) {
        let reason = reason.into();
        self.log_with_data(
            TestPhase::Verify,
            "TEST FAIL",
            serde_json::json!({ "reason": reason }),
        );
    }

    fn record(&self, phase: TestPhase, message: String, data: Option<serde_json::Value>) {
        let entry = TestLogEntry {
            timestamp: chrono::Utc::now(),
            test: self.test.clone(),
            phase,
            message,
            data,
            elapsed_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        tracing::info!(
            test = %entry.test,
            phase = %entry.phase,
            elapsed_ms = entry.elapsed_ms,
            "{}",
            entry.message
        );

        if let Some(jsonl) = &self.jsonl
            && let Ok(line) = serde_json::to_string(&entry)
        {
            let mut writer = jsonl.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let _ = writeln!(writer, "{line}");
        }

        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }
}

/// `$CARGO_TARGET_DIR/test-logs`, or `target/test-logs` under the current directory.
fn log_dir() -> PathBuf {
    std::env::var_os("CARGO_TARGET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("target"))
        .join("test-logs")
}

fn open_jsonl(test: &str) -> Option<File> {
    let dir = log_dir();
    std::fs::create_dir_all(&dir).ok()?;
    let file_name: String = test
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    File::create(dir.join(format!("{file_name}.jsonl"))).ok()
}

//! Test support shared by the workspace crates.

pub mod log;

pub use log::{TestLogEntry, TestLogger, TestPhase, init_global_test_logging};

//! Shared types and utilities for pipeline coverage.
//!
//! - [`types`]: the `PipelineCoverage` record produced by every reconciliation
//! - [`config`]: typed environment parsing and the resolved settings
//! - [`logging`]: `tracing` subscriber bootstrap for the binaries
//! - [`testing`]: structured logging helpers for test suites

pub mod config;
pub mod logging;
pub mod testing;
pub mod types;

pub use config::{ConfigSource, CoverageSettings, EnvError, EnvParser, Sourced};
pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
pub use types::{
    API_VERSION, CoverageResult, CoverageSpec, KIND_PIPELINE_COVERAGE, ObjectMeta, Phase,
    PipelineCoverage, PipelineRef, RecordIdentity, TestSpec, generate_coverage_schema,
};
